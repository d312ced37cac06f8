//! 任务生命周期事件
//!
//! 调度核心在任务提交、执行、失败、错过与移除时广播事件，
//! 由生命周期监听器消费。事件始终携带结构化的 [`JobKey`]，
//! 下游不需要也不允许解析展示用的字符串键。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::value_objects::JobKey;

/// 任务生命周期事件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum JobEvent {
    /// 任务已提交到工作池
    Submitted {
        event_id: Uuid,
        key: JobKey,
        job_name: String,
        invoke_target: String,
        scheduled_time: DateTime<Utc>,
        occurred_at: DateTime<Utc>,
    },
    /// 任务执行成功
    Executed {
        event_id: Uuid,
        key: JobKey,
        job_name: String,
        invoke_target: String,
        scheduled_time: DateTime<Utc>,
        duration_ms: i64,
        message: Option<String>,
        occurred_at: DateTime<Utc>,
    },
    /// 任务执行失败
    Failed {
        event_id: Uuid,
        key: JobKey,
        job_name: String,
        invoke_target: String,
        scheduled_time: DateTime<Utc>,
        duration_ms: i64,
        error: String,
        detail: String,
        occurred_at: DateTime<Utc>,
    },
    /// 触发时间超出宽限期，本次执行被放弃
    Missed {
        event_id: Uuid,
        key: JobKey,
        job_name: String,
        invoke_target: String,
        scheduled_time: DateTime<Utc>,
        occurred_at: DateTime<Utc>,
    },
    /// 任务从运行态存储中移除
    Removed {
        event_id: Uuid,
        key: JobKey,
        job_name: String,
        invoke_target: String,
        occurred_at: DateTime<Utc>,
    },
}

impl JobEvent {
    pub fn event_id(&self) -> Uuid {
        match self {
            JobEvent::Submitted { event_id, .. }
            | JobEvent::Executed { event_id, .. }
            | JobEvent::Failed { event_id, .. }
            | JobEvent::Missed { event_id, .. }
            | JobEvent::Removed { event_id, .. } => *event_id,
        }
    }

    pub fn event_type(&self) -> &str {
        match self {
            JobEvent::Submitted { .. } => "Submitted",
            JobEvent::Executed { .. } => "Executed",
            JobEvent::Failed { .. } => "Failed",
            JobEvent::Missed { .. } => "Missed",
            JobEvent::Removed { .. } => "Removed",
        }
    }

    pub fn key(&self) -> &JobKey {
        match self {
            JobEvent::Submitted { key, .. }
            | JobEvent::Executed { key, .. }
            | JobEvent::Failed { key, .. }
            | JobEvent::Missed { key, .. }
            | JobEvent::Removed { key, .. } => key,
        }
    }

    pub fn job_name(&self) -> &str {
        match self {
            JobEvent::Submitted { job_name, .. }
            | JobEvent::Executed { job_name, .. }
            | JobEvent::Failed { job_name, .. }
            | JobEvent::Missed { job_name, .. }
            | JobEvent::Removed { job_name, .. } => job_name,
        }
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            JobEvent::Submitted { occurred_at, .. }
            | JobEvent::Executed { occurred_at, .. }
            | JobEvent::Failed { occurred_at, .. }
            | JobEvent::Missed { occurred_at, .. }
            | JobEvent::Removed { occurred_at, .. } => *occurred_at,
        }
    }
}
