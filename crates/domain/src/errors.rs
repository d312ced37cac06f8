use thiserror::Error;

/// 调度器错误类型定义
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("无效的CRON表达式: {expr} - {message}")]
    InvalidCron { expr: String, message: String },

    #[error("调用目标格式错误: {0}")]
    InvalidTarget(String),

    #[error("调用目标不在白名单内: {0}")]
    TargetNotAllowed(String),

    #[error("调用目标未注册: {0}")]
    TargetNotRegistered(String),

    #[error("任务未找到: {id}")]
    JobNotFound { id: i64 },

    #[error("任务已存在: {key}")]
    JobConflict { key: String },

    #[error("任务执行错误: {0}")]
    JobExecution(String),

    #[error("数据库操作错误: {0}")]
    DatabaseOperation(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 统一的Result类型
pub type SchedulerResult<T> = std::result::Result<T, SchedulerError>;

impl SchedulerError {
    pub fn invalid_target<S: Into<String>>(msg: S) -> Self {
        Self::InvalidTarget(msg.into())
    }

    pub fn job_not_found(id: i64) -> Self {
        Self::JobNotFound { id }
    }

    pub fn database_error<S: Into<String>>(msg: S) -> Self {
        Self::DatabaseOperation(msg.into())
    }

    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn execution_error<S: Into<String>>(msg: S) -> Self {
        Self::JobExecution(msg.into())
    }

    /// 配置与内部错误不可重试，启动阶段遇到需要直接终止
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SchedulerError::Configuration(_) | SchedulerError::Internal(_)
        )
    }
}

impl From<serde_json::Error> for SchedulerError {
    fn from(err: serde_json::Error) -> Self {
        SchedulerError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for SchedulerError {
    fn from(err: anyhow::Error) -> Self {
        SchedulerError::Internal(err.to_string())
    }
}
