//! 数据仓储层接口定义
//!
//! 调度核心只依赖这些抽象，不关心持久化细节。接口由外部系统
//! （Web应用、管理后台等）实现；所有操作都是异步的，实现需要
//! `Send + Sync` 以便在多线程环境中共享。

use std::any::Any;

use async_trait::async_trait;

use crate::entities::{JobDefinition, JobExecutionLog, JobFilter, JobLogFilter};
use crate::errors::SchedulerResult;

/// 任务定义仓储接口
///
/// 任务定义的唯一持久化入口。调度器启动时通过 `list_all` 加载全部
/// 任务，管理操作先写仓储、成功后才变更运行态。
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// 加载全部任务定义
    async fn list_all(&self) -> SchedulerResult<Vec<JobDefinition>>;

    /// 按条件查询任务定义
    async fn list_matching(&self, filter: &JobFilter) -> SchedulerResult<Vec<JobDefinition>>;

    /// 根据ID获取任务定义
    async fn get_by_id(&self, job_id: i64) -> SchedulerResult<Option<JobDefinition>>;

    /// 新建任务定义，返回包含存储分配ID的实体
    async fn create(&self, job: &JobDefinition) -> SchedulerResult<JobDefinition>;

    /// 更新任务定义，返回受影响的行数
    async fn update(&self, job: &JobDefinition) -> SchedulerResult<u64>;

    /// 按ID删除任务定义，返回受影响的行数
    async fn delete_by_id(&self, job_id: i64) -> SchedulerResult<u64>;

    /// 按ID批量删除任务定义，返回受影响的行数
    async fn delete_by_ids(&self, job_ids: &[i64]) -> SchedulerResult<u64>;
}

/// 任务执行日志仓储接口
///
/// 日志记录只增不改；调度核心只负责写入，从不回读。
#[async_trait]
pub trait ExecutionLogRepository: Send + Sync {
    /// 写入一条执行日志
    async fn insert(&self, log: &JobExecutionLog) -> SchedulerResult<JobExecutionLog>;

    /// 按条件查询执行日志
    async fn list_matching(&self, filter: &JobLogFilter) -> SchedulerResult<Vec<JobExecutionLog>>;

    /// 按ID删除执行日志
    async fn delete_by_id(&self, job_log_id: i64) -> SchedulerResult<u64>;

    /// 按ID批量删除执行日志
    async fn delete_by_ids(&self, job_log_ids: &[i64]) -> SchedulerResult<u64>;

    /// 清空全部执行日志
    async fn clear_all(&self) -> SchedulerResult<u64>;
}

/// 应用上下文提供者
///
/// 任务体在任何HTTP请求之外运行，执行期间需要的环境（数据库
/// 会话、租户信息等）由宿主通过该接口注入。`as_any` 允许处理器
/// 向下转型到宿主的具体上下文类型。
pub trait ApplicationContext: Send + Sync {
    /// 环境名称，例如 "prod" / "dev" / "test"
    fn environment(&self) -> &str;

    fn as_any(&self) -> &dyn Any;
}
