//! 定时任务调度引擎
//!
//! 以库的形式嵌入宿主应用：宿主提供任务定义仓储、执行日志仓储与
//! 应用上下文，并在启动时注册可被调度的任务处理器；本引擎负责把
//! 持久化的任务定义转成运行态触发器，在后台循环中按计划派发执行，
//! 并把失败写回执行日志。

pub mod app;
pub mod config;
pub mod shutdown;

pub use app::{init_logging, Application};
pub use config::{AppConfig, LogConfig, SchedulerConfig};
pub use shutdown::{wait_for_shutdown_signal, ShutdownManager};

pub use sysjob_dispatcher as dispatcher;
pub use sysjob_domain as domain;

// 常用类型再导出
pub use sysjob_dispatcher::{
    HandlerRegistry, JobContext, JobHandler, JobLogListener, JobScheduler, JobService, PoolKind,
};
pub use sysjob_domain::{
    ApplicationContext, ConcurrencyPolicy, ExecutionLogRepository, JobDefinition, JobEvent,
    JobExecutionLog, JobKey, JobRepository, JobStatus, MisfirePolicy, SchedulerError,
    SchedulerResult,
};
