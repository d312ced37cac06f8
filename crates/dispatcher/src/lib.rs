//! 调度核心
//!
//! 本crate负责定时任务的运行态：cron触发器解析、策略解析、
//! 调用目标注册表、运行态任务存储、后台调度循环、生命周期
//! 监听以及面向管理操作的编排服务。持久化与日志落库通过
//! `sysjob-domain` 中的仓储接口交给宿主实现。

pub mod cron_utils;
pub mod handlers;
pub mod job_store;
pub mod policies;
pub mod scheduler;
pub mod service;
pub mod state_listener;

#[cfg(test)]
pub mod test_utils;

pub use cron_utils::CronTrigger;
pub use handlers::{HandlerRegistry, JobContext, JobHandler, PoolKind};
pub use job_store::{FireDecision, JobStore, LiveJob, LiveJobState};
pub use policies::{resolve_max_instances, resolve_misfire, MisfireBehavior};
pub use scheduler::{JobScheduler, JobSchedulerBuilder};
pub use service::JobService;
pub use state_listener::JobLogListener;
