//! 调度策略解析
//!
//! 把任务定义里的策略编码映射为调度核心的运行参数。

use chrono::Duration;

use sysjob_domain::{ConcurrencyPolicy, MisfirePolicy};

/// 错过触发的处理行为
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MisfireBehavior {
    /// 迟到宽限期，None 表示无论迟到多久都照常执行
    pub grace_period: Option<Duration>,
    /// 注册时是否覆盖同键的已有任务
    pub replace_existing: bool,
}

/// 解析错过触发策略
pub fn resolve_misfire(policy: MisfirePolicy) -> MisfireBehavior {
    match policy {
        MisfirePolicy::Default | MisfirePolicy::IgnoreMisfires => MisfireBehavior {
            grace_period: None,
            replace_existing: true,
        },
        MisfirePolicy::FireAndProceed => MisfireBehavior {
            grace_period: Some(Duration::seconds(1)),
            replace_existing: false,
        },
        MisfirePolicy::DoNothing => MisfireBehavior {
            grace_period: None,
            replace_existing: false,
        },
    }
}

/// 解析并发策略为单任务最大并发实例数
pub fn resolve_max_instances(policy: ConcurrencyPolicy) -> usize {
    match policy {
        ConcurrencyPolicy::Allow => 10,
        ConcurrencyPolicy::Forbidden => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_misfire_table() {
        let default = resolve_misfire(MisfirePolicy::Default);
        assert_eq!(default.grace_period, None);
        assert!(default.replace_existing);

        let ignore = resolve_misfire(MisfirePolicy::IgnoreMisfires);
        assert_eq!(ignore.grace_period, None);
        assert!(ignore.replace_existing);

        let fire_once = resolve_misfire(MisfirePolicy::FireAndProceed);
        assert_eq!(fire_once.grace_period, Some(Duration::seconds(1)));
        assert!(!fire_once.replace_existing);

        let do_nothing = resolve_misfire(MisfirePolicy::DoNothing);
        assert_eq!(do_nothing.grace_period, None);
        assert!(!do_nothing.replace_existing);
    }

    #[test]
    fn test_unknown_code_collapses_to_do_nothing() {
        // 未知编码在实体解码时已回落到 DoNothing
        let behavior = resolve_misfire(MisfirePolicy::from_code("9"));
        assert_eq!(behavior.grace_period, None);
        assert!(!behavior.replace_existing);
    }

    #[test]
    fn test_concurrency_table() {
        assert_eq!(resolve_max_instances(ConcurrencyPolicy::Allow), 10);
        assert_eq!(resolve_max_instances(ConcurrencyPolicy::Forbidden), 1);
        assert_eq!(
            resolve_max_instances(ConcurrencyPolicy::from_code("anything")),
            1
        );
    }
}
