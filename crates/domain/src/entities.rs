use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::JobKey;

/// 任务定义
///
/// 持久化的定时任务配置，由外部存储负责保存。调度器注册时会把它
/// 转换为运行态任务（触发器 + 处理器 + 策略），运行态本身不落库。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDefinition {
    pub job_id: i64,
    pub job_name: String,
    pub job_group: String,
    pub invoke_target: String,   // 调用目标字符串
    pub cron_expression: String, // cron 表达式（6或7段，? 等价于 *）
    pub misfire_policy: MisfirePolicy,
    pub concurrent: ConcurrencyPolicy,
    pub status: JobStatus,
    pub create_by: String,
    pub create_time: DateTime<Utc>,
    pub update_by: String,
    pub update_time: DateTime<Utc>,
    pub remark: String,
}

impl JobDefinition {
    pub fn new(
        job_name: impl Into<String>,
        job_group: impl Into<String>,
        invoke_target: impl Into<String>,
        cron_expression: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            job_id: 0, // 将由存储生成
            job_name: job_name.into(),
            job_group: job_group.into(),
            invoke_target: invoke_target.into(),
            cron_expression: cron_expression.into(),
            misfire_policy: MisfirePolicy::Default,
            concurrent: ConcurrencyPolicy::Forbidden,
            status: JobStatus::Normal,
            create_by: String::new(),
            create_time: now,
            update_by: String::new(),
            update_time: now,
            remark: String::new(),
        }
    }

    pub fn is_normal(&self) -> bool {
        matches!(self.status, JobStatus::Normal)
    }

    /// 运行态任务的复合标识
    pub fn job_key(&self) -> JobKey {
        JobKey::new(self.job_id, &self.job_group)
    }

    pub fn entity_description(&self) -> String {
        format!(
            "任务 '{}' (ID: {}, 分组: {})",
            self.job_name, self.job_id, self.job_group
        )
    }
}

/// 任务状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum JobStatus {
    #[serde(rename = "0")]
    Normal,
    #[serde(rename = "1")]
    Paused,
}

impl JobStatus {
    /// 按存储编码解析，未知编码一律视为暂停
    pub fn from_code(code: &str) -> Self {
        match code {
            "0" => JobStatus::Normal,
            _ => JobStatus::Paused,
        }
    }

    pub fn as_code(&self) -> &'static str {
        match self {
            JobStatus::Normal => "0",
            JobStatus::Paused => "1",
        }
    }
}

/// 计划执行错误策略
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MisfirePolicy {
    #[serde(rename = "0")]
    Default,
    #[serde(rename = "1")]
    IgnoreMisfires,
    #[serde(rename = "2")]
    FireAndProceed,
    #[serde(rename = "3")]
    DoNothing,
}

impl MisfirePolicy {
    /// 按存储编码解析，未知编码按放弃执行处理
    pub fn from_code(code: &str) -> Self {
        match code {
            "0" => MisfirePolicy::Default,
            "1" => MisfirePolicy::IgnoreMisfires,
            "2" => MisfirePolicy::FireAndProceed,
            _ => MisfirePolicy::DoNothing,
        }
    }

    pub fn as_code(&self) -> &'static str {
        match self {
            MisfirePolicy::Default => "0",
            MisfirePolicy::IgnoreMisfires => "1",
            MisfirePolicy::FireAndProceed => "2",
            MisfirePolicy::DoNothing => "3",
        }
    }
}

/// 并发执行策略
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ConcurrencyPolicy {
    #[serde(rename = "0")]
    Allow,
    #[serde(rename = "1")]
    Forbidden,
}

impl ConcurrencyPolicy {
    /// 按存储编码解析，未知编码按禁止并发处理
    pub fn from_code(code: &str) -> Self {
        match code {
            "0" => ConcurrencyPolicy::Allow,
            _ => ConcurrencyPolicy::Forbidden,
        }
    }

    pub fn as_code(&self) -> &'static str {
        match self {
            ConcurrencyPolicy::Allow => "0",
            ConcurrencyPolicy::Forbidden => "1",
        }
    }
}

/// 任务查询条件
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub job_name: Option<String>,
    pub job_group: Option<String>,
    pub status: Option<JobStatus>,
}

/// 任务执行日志
///
/// 仅由生命周期监听器在任务执行失败时创建，写入后不再修改，
/// 只能通过按ID删除或整表清空的管理操作移除。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobExecutionLog {
    pub job_log_id: i64,
    pub job_name: String,
    pub job_group: String,
    pub invoke_target: String,
    pub job_message: String,
    pub status: JobLogStatus,
    pub exception_info: String,
    pub create_time: DateTime<Utc>,
}

impl JobExecutionLog {
    pub fn failure(
        job_name: impl Into<String>,
        job_group: impl Into<String>,
        invoke_target: impl Into<String>,
        job_message: impl Into<String>,
        exception_info: impl Into<String>,
    ) -> Self {
        Self {
            job_log_id: 0, // 将由存储生成
            job_name: job_name.into(),
            job_group: job_group.into(),
            invoke_target: invoke_target.into(),
            job_message: job_message.into(),
            status: JobLogStatus::Fail,
            exception_info: exception_info.into(),
            create_time: Utc::now(),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.status, JobLogStatus::Fail)
    }
}

/// 执行日志状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum JobLogStatus {
    #[serde(rename = "0")]
    Success,
    #[serde(rename = "1")]
    Fail,
}

/// 执行日志查询条件
#[derive(Debug, Clone, Default)]
pub struct JobLogFilter {
    pub job_name: Option<String>,
    pub job_group: Option<String>,
    pub status: Option<JobLogStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_definition_defaults() {
        let job = JobDefinition::new("backup", "DEFAULT", "tasks.backup.run", "0 0 2 * * ?");
        assert_eq!(job.job_id, 0);
        assert!(job.is_normal());
        assert_eq!(job.misfire_policy, MisfirePolicy::Default);
        assert_eq!(job.concurrent, ConcurrencyPolicy::Forbidden);
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(JobStatus::from_code("0"), JobStatus::Normal);
        assert_eq!(JobStatus::from_code("1"), JobStatus::Paused);
        assert_eq!(JobStatus::from_code("x"), JobStatus::Paused);
        assert_eq!(JobStatus::Normal.as_code(), "0");
    }

    #[test]
    fn test_misfire_policy_codes() {
        assert_eq!(MisfirePolicy::from_code("1"), MisfirePolicy::IgnoreMisfires);
        assert_eq!(MisfirePolicy::from_code("2"), MisfirePolicy::FireAndProceed);
        // 未知编码回落到放弃执行
        assert_eq!(MisfirePolicy::from_code("9"), MisfirePolicy::DoNothing);
    }

    #[test]
    fn test_concurrency_policy_codes() {
        assert_eq!(ConcurrencyPolicy::from_code("0"), ConcurrencyPolicy::Allow);
        assert_eq!(
            ConcurrencyPolicy::from_code("whatever"),
            ConcurrencyPolicy::Forbidden
        );
    }

    #[test]
    fn test_serde_uses_stored_codes() {
        let job = JobDefinition::new("t", "DEFAULT", "tasks.t.run", "0 * * * * *");
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["status"], "0");
        assert_eq!(json["concurrent"], "1");
        assert_eq!(json["misfire_policy"], "0");
    }

    #[test]
    fn test_failure_log() {
        let log = JobExecutionLog::failure("t", "DEFAULT", "tasks.t.run", "执行失败", "boom");
        assert!(log.is_failure());
        assert_eq!(log.job_log_id, 0);
        assert!(!log.exception_info.is_empty());
    }
}
