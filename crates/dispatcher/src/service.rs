//! 任务管理服务
//!
//! 持久化存储与运行态调度器之间的编排门面。所有管理操作遵循同一
//! 顺序：先校验、再落库、落库成功后才变更运行态——持久化失败时
//! 运行态保持原样，错误原样抛给调用方。

use std::sync::Arc;

use tracing::{info, warn};

use sysjob_domain::{
    InvokeTarget, JobDefinition, JobRepository, JobStatus, SchedulerError, SchedulerResult,
};

use crate::cron_utils::CronTrigger;
use crate::scheduler::JobScheduler;

pub struct JobService {
    job_repo: Arc<dyn JobRepository>,
    scheduler: Arc<JobScheduler>,
}

impl JobService {
    pub fn new(job_repo: Arc<dyn JobRepository>, scheduler: Arc<JobScheduler>) -> Self {
        Self {
            job_repo,
            scheduler,
        }
    }

    pub fn scheduler(&self) -> &Arc<JobScheduler> {
        &self.scheduler
    }

    /// 启动初始化
    ///
    /// 清空运行态后重新加载全部持久化任务定义并逐个注册。任何一个
    /// 任务的调用目标无法解析都会升级为致命的配置错误并指明任务，
    /// 由运维修正存储中的数据后重启。
    pub async fn init(&self) -> SchedulerResult<()> {
        self.scheduler.clear_all().await;
        let jobs = self.job_repo.list_all().await?;
        info!("加载到 {} 个持久化任务定义", jobs.len());
        for job in &jobs {
            self.scheduler.create_schedule_job(job).await.map_err(|e| {
                SchedulerError::Configuration(format!(
                    "初始化{}失败: {e}",
                    job.entity_description()
                ))
            })?;
        }
        info!("任务初始化完成，运行态任务数: {}", jobs.len());
        Ok(())
    }

    /// 新建任务
    ///
    /// 校验在落库之前执行：非法的cron表达式或调用目标直接拒绝，
    /// 不会留下没有运行态注册的悬空行。
    pub async fn insert_job(&self, job: &mut JobDefinition) -> SchedulerResult<bool> {
        self.validate(job).await?;

        let created = self.job_repo.create(job).await?;
        job.job_id = created.job_id;
        self.scheduler.create_schedule_job(&created).await?;

        info!("{} 创建成功", created.entity_description());
        Ok(created.job_id > 0)
    }

    /// 更新任务
    ///
    /// 策略或触发器可能已变化，运行态注册不做原地修改：移除旧的
    /// 注册（按更新前的键，任务可能换了分组）后整体重建。
    pub async fn update_job(&self, job: &JobDefinition) -> SchedulerResult<bool> {
        self.validate(job).await?;

        let previous = self
            .job_repo
            .get_by_id(job.job_id)
            .await?
            .ok_or(SchedulerError::JobNotFound { id: job.job_id })?;

        let rows = self.job_repo.update(job).await?;
        if rows > 0 {
            self.scheduler.remove_job(&previous.job_key()).await;
            self.scheduler.create_schedule_job(job).await?;
            info!("{} 更新成功", job.entity_description());
        }
        Ok(rows > 0)
    }

    /// 删除任务
    pub async fn delete_job(&self, job: &JobDefinition) -> SchedulerResult<bool> {
        let rows = self.job_repo.delete_by_id(job.job_id).await?;
        if rows > 0 {
            self.scheduler.remove_job(&job.job_key()).await;
            info!("{} 已删除", job.entity_description());
        }
        Ok(rows > 0)
    }

    /// 批量删除任务
    ///
    /// 运行态的键需要分组信息，先按ID回查再删行。
    pub async fn delete_jobs(&self, job_ids: &[i64]) -> SchedulerResult<u64> {
        let mut keys = Vec::with_capacity(job_ids.len());
        for job_id in job_ids {
            match self.job_repo.get_by_id(*job_id).await? {
                Some(job) => keys.push(job.job_key()),
                None => warn!("批量删除时任务 {} 不存在，跳过", job_id),
            }
        }

        let rows = self.job_repo.delete_by_ids(job_ids).await?;
        for key in &keys {
            self.scheduler.remove_job(key).await;
        }
        info!("批量删除了 {} 个任务", rows);
        Ok(rows)
    }

    /// 暂停任务
    ///
    /// 运行态条目保留（只是不再触发），恢复时无需重新解析目标。
    pub async fn pause_job(&self, job: &mut JobDefinition) -> SchedulerResult<bool> {
        job.status = JobStatus::Paused;
        let rows = self.job_repo.update(job).await?;
        if rows > 0 {
            self.scheduler.pause_job(&job.job_key()).await;
        }
        Ok(rows > 0)
    }

    /// 恢复任务
    ///
    /// 运行态缺失时整体重建而不是报错：暂停跨越完整移除后留不下
    /// 足够的运行信息，只能从定义重新派生。
    pub async fn resume_job(&self, job: &mut JobDefinition) -> SchedulerResult<bool> {
        job.status = JobStatus::Normal;
        let rows = self.job_repo.update(job).await?;
        if rows > 0 {
            let resumed = self.scheduler.resume_job(&job.job_key()).await;
            if !resumed {
                warn!("{} 的运行态不存在，重新注册", job.entity_description());
                self.scheduler.create_schedule_job(job).await?;
            }
        }
        Ok(rows > 0)
    }

    /// 按定义中的状态字段分派到暂停或恢复
    pub async fn change_status(&self, job: &mut JobDefinition) -> SchedulerResult<bool> {
        match job.status {
            JobStatus::Normal => self.resume_job(job).await,
            JobStatus::Paused => self.pause_job(job).await,
        }
    }

    /// 立即执行一次
    ///
    /// 只拨动运行态的下次触发时间，持久化的cron计划保持不变；
    /// 运行态缺失时先从定义重建再触发。
    pub async fn run_job_now(&self, job: &JobDefinition) -> SchedulerResult<bool> {
        let cron = match job.cron_expression.trim() {
            "" => None,
            expr => Some(expr),
        };
        let nudged = self.scheduler.reschedule_job(&job.job_key(), cron).await?;
        if !nudged {
            warn!("{} 的运行态不存在，重建后触发", job.entity_description());
            self.scheduler.create_schedule_job(job).await?;
            self.scheduler.reschedule_job(&job.job_key(), None).await?;
        }
        info!("{} 将立即执行一次", job.entity_description());
        Ok(true)
    }

    /// 创建/更新前的统一校验：cron、目标文法、白名单、注册表
    async fn validate(&self, job: &JobDefinition) -> SchedulerResult<()> {
        CronTrigger::parse(&job.cron_expression)?;
        let target = InvokeTarget::parse(&job.invoke_target)?;
        self.scheduler.registry().resolve(&target).await?;
        Ok(())
    }
}
