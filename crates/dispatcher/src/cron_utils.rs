use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule;

use sysjob_domain::{SchedulerError, SchedulerResult};

/// CRON表达式解析和触发时间计算工具
///
/// 存储里的表达式采用 quartz 风格：`?` 与 `*` 等价，允许 6 段
/// （秒 分 时 日 月 周）或带年份的 7 段。底层的 cron 库不识别
/// `?`，构造触发器之前必须先归一化。
#[derive(Debug)]
pub struct CronTrigger {
    schedule: Schedule,
    expression: String,
}

impl CronTrigger {
    /// 解析CRON表达式，失败返回 `InvalidCron`
    pub fn parse(cron_expr: &str) -> SchedulerResult<Self> {
        let normalized = normalize(cron_expr)?;
        let schedule =
            Schedule::from_str(&normalized).map_err(|e| SchedulerError::InvalidCron {
                expr: cron_expr.to_string(),
                message: e.to_string(),
            })?;

        Ok(Self {
            schedule,
            expression: cron_expr.trim().to_string(),
        })
    }

    /// 校验CRON表达式是否有效，不抛出错误
    pub fn validate(cron_expr: &str) -> bool {
        Self::parse(cron_expr).is_ok()
    }

    /// 原始表达式（归一化前）
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// 获取下一次触发时间（严格晚于 `after`）
    pub fn next_fire_time(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&after).next()
    }

    /// 获取从指定时间开始的多个触发时间
    pub fn upcoming(&self, from: DateTime<Utc>, count: usize) -> Vec<DateTime<Utc>> {
        self.schedule.after(&from).take(count).collect()
    }

    /// 取 `(after, until]` 区间内的全部触发时间
    ///
    /// 调度循环用它把积压的触发合并成一次执行。
    pub fn fires_between(
        &self,
        after: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Vec<DateTime<Utc>> {
        self.schedule
            .after(&after)
            .take_while(|t| *t <= until)
            .collect()
    }
}

/// 替换 `?` 为 `*` 并检查段数
fn normalize(cron_expr: &str) -> SchedulerResult<String> {
    let normalized = cron_expr.trim().replace('?', "*");
    let fields = normalized.split_whitespace().count();
    if !(6..=7).contains(&fields) {
        return Err(SchedulerError::InvalidCron {
            expr: cron_expr.to_string(),
            message: format!("表达式必须为6或7段，实际为{fields}段"),
        });
    }
    Ok(normalized)
}
