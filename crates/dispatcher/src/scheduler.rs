//! 调度核心
//!
//! 单个后台调度循环负责全部时间判定，任务体在有界工作池中执行，
//! 与宿主的请求线程完全解耦。管理操作在调用方协程上同步执行，
//! 与调度循环共享的只有运行态任务注册表。

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use tokio::sync::{broadcast, Mutex, RwLock, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use sysjob_domain::{
    ApplicationContext, InvokeTarget, JobDefinition, JobEvent, JobKey, SchedulerError,
    SchedulerResult,
};

use crate::cron_utils::CronTrigger;
use crate::handlers::{HandlerRegistry, JobContext, JobHandler, PoolKind};
use crate::job_store::{FireDecision, JobStore, LiveJob, LiveJobState};
use crate::policies::{resolve_max_instances, resolve_misfire};

/// 调度器构建器
pub struct JobSchedulerBuilder {
    registry: Arc<HandlerRegistry>,
    app_context: Arc<dyn ApplicationContext>,
    tick_interval: Duration,
    worker_pool_size: usize,
    heavy_pool_size: usize,
    event_capacity: usize,
}

impl JobSchedulerBuilder {
    pub fn new(registry: Arc<HandlerRegistry>, app_context: Arc<dyn ApplicationContext>) -> Self {
        Self {
            registry,
            app_context,
            tick_interval: Duration::from_millis(500),
            worker_pool_size: 20,
            heavy_pool_size: 5,
            event_capacity: 256,
        }
    }

    /// 设置调度循环扫描间隔
    pub fn tick_interval(mut self, tick_interval: Duration) -> Self {
        self.tick_interval = tick_interval;
        self
    }

    /// 设置普通任务池容量
    pub fn worker_pool_size(mut self, worker_pool_size: usize) -> Self {
        self.worker_pool_size = worker_pool_size;
        self
    }

    /// 设置重型任务池容量
    pub fn heavy_pool_size(mut self, heavy_pool_size: usize) -> Self {
        self.heavy_pool_size = heavy_pool_size;
        self
    }

    /// 设置事件通道容量
    pub fn event_capacity(mut self, event_capacity: usize) -> Self {
        self.event_capacity = event_capacity;
        self
    }

    pub fn build(self) -> JobScheduler {
        let (event_tx, _) = broadcast::channel(self.event_capacity.max(1));
        let (shutdown_tx, _) = broadcast::channel(1);
        JobScheduler {
            ctx: DispatchContext {
                store: Arc::new(JobStore::new()),
                event_tx,
                default_pool: Arc::new(Semaphore::new(self.worker_pool_size.max(1))),
                heavy_pool: Arc::new(Semaphore::new(self.heavy_pool_size.max(1))),
                in_flight: Arc::new(AtomicUsize::new(0)),
                app_context: self.app_context,
            },
            registry: self.registry,
            tick_interval: self.tick_interval,
            shutdown_tx,
            is_running: RwLock::new(false),
            loop_handle: Mutex::new(None),
        }
    }
}

/// 调度器
///
/// 进程内唯一的调度实例，由组合根创建一次并注入服务层，
/// 不使用任何进程级全局状态。
pub struct JobScheduler {
    ctx: DispatchContext,
    registry: Arc<HandlerRegistry>,
    tick_interval: Duration,
    shutdown_tx: broadcast::Sender<()>,
    is_running: RwLock<bool>,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
}

impl JobScheduler {
    pub fn builder(
        registry: Arc<HandlerRegistry>,
        app_context: Arc<dyn ApplicationContext>,
    ) -> JobSchedulerBuilder {
        JobSchedulerBuilder::new(registry, app_context)
    }

    /// 订阅生命周期事件
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.ctx.event_tx.subscribe()
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    pub(crate) fn store(&self) -> &Arc<JobStore> {
        &self.ctx.store
    }

    /// 注册任务
    ///
    /// 解析调用目标、白名单与注册表校验、解析触发器、解析策略，
    /// 全部通过后才写入运行态存储；定义处于暂停状态时注册后立即
    /// 暂停，保留恢复位置。校验失败会原样抛给调用方。
    pub async fn create_schedule_job(&self, job: &JobDefinition) -> SchedulerResult<()> {
        let target = InvokeTarget::parse(&job.invoke_target)?;
        let handler = self.registry.resolve(&target).await?;
        let trigger = CronTrigger::parse(&job.cron_expression)?;
        let behavior = resolve_misfire(job.misfire_policy);
        let max_instances = resolve_max_instances(job.concurrent);

        let key = job.job_key();
        let live = LiveJob::new(
            key.clone(),
            job.job_name.clone(),
            target,
            handler,
            trigger,
            behavior,
            max_instances,
            Utc::now(),
        );
        self.ctx.store.insert(live, behavior.replace_existing).await?;

        if !job.is_normal() {
            self.ctx.store.pause(&key).await;
            info!("{} 注册后处于暂停状态", job.entity_description());
        } else {
            info!(
                "{} 已注册，计划: {}",
                job.entity_description(),
                job.cron_expression
            );
        }
        Ok(())
    }

    /// 暂停任务，幂等
    pub async fn pause_job(&self, key: &JobKey) -> bool {
        let paused = self.ctx.store.pause(key).await;
        if paused {
            info!("任务 {} 已暂停", key);
        } else {
            debug!("暂停任务 {} 时运行态不存在", key);
        }
        paused
    }

    /// 恢复任务；运行态缺失时返回 false，由调用方整体重建
    pub async fn resume_job(&self, key: &JobKey) -> bool {
        let resumed = self.ctx.store.resume(key).await;
        if resumed {
            info!("任务 {} 已恢复", key);
        }
        resumed
    }

    /// 移除任务并广播 Removed 事件
    pub async fn remove_job(&self, key: &JobKey) -> bool {
        match self.ctx.store.remove(key).await {
            Some(live) => {
                info!("任务 {} 已从调度器移除", key);
                self.ctx.emit(JobEvent::Removed {
                    event_id: Uuid::new_v4(),
                    key: live.key,
                    job_name: live.job_name,
                    invoke_target: live.target.to_string(),
                    occurred_at: Utc::now(),
                });
                true
            }
            None => false,
        }
    }

    /// 立即触发任务
    ///
    /// 给了cron表达式就先换上新触发器，然后把下次触发时间拨到当前
    /// 时刻；没给表达式就只做恢复加立即触发。运行态缺失时返回
    /// Ok(false)。
    pub async fn reschedule_job(
        &self,
        key: &JobKey,
        cron_expression: Option<&str>,
    ) -> SchedulerResult<bool> {
        let trigger = match cron_expression {
            Some(expr) => Some(CronTrigger::parse(expr)?),
            None => None,
        };
        let nudged = self.ctx.store.nudge(key, trigger).await;
        if nudged {
            info!("任务 {} 将在下一次扫描时立即触发", key);
        }
        Ok(nudged)
    }

    /// 清空全部运行态任务（启动重载用，不广播事件）
    pub async fn clear_all(&self) {
        self.ctx.store.clear().await;
    }

    pub async fn job_state(&self, key: &JobKey) -> Option<LiveJobState> {
        self.ctx.store.state(key).await
    }

    pub async fn has_job(&self, key: &JobKey) -> bool {
        self.ctx.store.contains(key).await
    }

    pub async fn live_count(&self) -> usize {
        self.ctx.store.len().await
    }

    /// 手动执行一次到期扫描
    pub async fn dispatch_due_jobs(&self) {
        self.ctx.dispatch_due().await;
    }

    /// 启动后台调度循环
    pub async fn start(&self) -> SchedulerResult<()> {
        let mut running = self.is_running.write().await;
        if *running {
            return Err(SchedulerError::Internal("调度器已经启动".to_string()));
        }
        *running = true;

        let ctx = self.ctx.clone();
        let tick = self.tick_interval;
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        ctx.dispatch_due().await;
                    }
                    _ = shutdown_rx.recv() => {
                        info!("调度循环收到关闭信号");
                        break;
                    }
                }
            }
        });
        *self.loop_handle.lock().await = Some(handle);

        info!("调度器已启动，扫描间隔 {:?}", tick);
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    /// 停止调度循环并在限定时间内等待在途任务完成
    pub async fn shutdown(&self, timeout: Duration) {
        {
            let mut running = self.is_running.write().await;
            if !*running {
                return;
            }
            *running = false;
        }
        let _ = self.shutdown_tx.send(());
        if let Some(handle) = self.loop_handle.lock().await.take() {
            let _ = handle.await;
        }

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let in_flight = self.ctx.in_flight.load(Ordering::SeqCst);
            if in_flight == 0 {
                break;
            }
            if tokio::time::Instant::now() >= deadline {
                warn!("等待在途任务超时，仍有 {} 个任务未完成", in_flight);
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        info!("调度器已停止");
    }
}

/// 调度循环与工作协程共享的运行组件
#[derive(Clone)]
struct DispatchContext {
    store: Arc<JobStore>,
    event_tx: broadcast::Sender<JobEvent>,
    default_pool: Arc<Semaphore>,
    heavy_pool: Arc<Semaphore>,
    in_flight: Arc<AtomicUsize>,
    app_context: Arc<dyn ApplicationContext>,
}

impl DispatchContext {
    async fn dispatch_due(&self) {
        let decisions = self.store.collect_due(Utc::now()).await;
        for decision in decisions {
            self.fire(decision);
        }
    }

    fn fire(&self, decision: FireDecision) {
        if decision.missed {
            warn!(
                "任务 {} 错过触发时间 {}，超出宽限期，本次放弃",
                decision.key, decision.scheduled_time
            );
            metrics::counter!("sysjob_missed_total").increment(1);
            self.emit(JobEvent::Missed {
                event_id: Uuid::new_v4(),
                key: decision.key,
                job_name: decision.job_name,
                invoke_target: decision.invoke_target,
                scheduled_time: decision.scheduled_time,
                occurred_at: Utc::now(),
            });
            return;
        }

        // 上一个实例还在运行且已到并发上限：跳过，不排队
        let running_now = decision.running.load(Ordering::SeqCst);
        if running_now >= decision.max_instances {
            warn!(
                "任务 {} 已有 {} 个实例在运行，本次触发被合并跳过",
                decision.key, running_now
            );
            metrics::counter!("sysjob_skipped_total").increment(1);
            return;
        }

        decision.running.fetch_add(1, Ordering::SeqCst);
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        metrics::counter!("sysjob_fired_total").increment(1);

        self.emit(JobEvent::Submitted {
            event_id: Uuid::new_v4(),
            key: decision.key.clone(),
            job_name: decision.job_name.clone(),
            invoke_target: decision.invoke_target.clone(),
            scheduled_time: decision.scheduled_time,
            occurred_at: Utc::now(),
        });

        let pool = match decision.handler.pool() {
            PoolKind::Default => Arc::clone(&self.default_pool),
            PoolKind::Heavy => Arc::clone(&self.heavy_pool),
        };
        let job_ctx = JobContext {
            key: decision.key.clone(),
            job_name: decision.job_name.clone(),
            args: decision.args.clone(),
            kwargs: decision.kwargs.clone(),
            app_context: Arc::clone(&self.app_context),
        };
        let event_tx = self.event_tx.clone();
        let in_flight = Arc::clone(&self.in_flight);

        tokio::spawn(async move {
            let permit = match pool.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    // 工作池已关闭，调度器正在退出
                    decision.running.fetch_sub(1, Ordering::SeqCst);
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    return;
                }
            };

            let started = std::time::Instant::now();
            let outcome = AssertUnwindSafe(decision.handler.execute(job_ctx))
                .catch_unwind()
                .await;
            let duration_ms = started.elapsed().as_millis() as i64;
            drop(permit);

            let occurred_at = Utc::now();
            let event = match outcome {
                Ok(Ok(message)) => {
                    debug!(
                        "任务 {} 执行成功，耗时 {} 毫秒",
                        decision.key, duration_ms
                    );
                    metrics::histogram!("sysjob_execution_duration_seconds")
                        .record(started.elapsed().as_secs_f64());
                    JobEvent::Executed {
                        event_id: Uuid::new_v4(),
                        key: decision.key.clone(),
                        job_name: decision.job_name.clone(),
                        invoke_target: decision.invoke_target.clone(),
                        scheduled_time: decision.scheduled_time,
                        duration_ms,
                        message,
                        occurred_at,
                    }
                }
                Ok(Err(e)) => {
                    error!("任务 {} 执行失败: {}", decision.key, e);
                    metrics::counter!("sysjob_failed_total").increment(1);
                    JobEvent::Failed {
                        event_id: Uuid::new_v4(),
                        key: decision.key.clone(),
                        job_name: decision.job_name.clone(),
                        invoke_target: decision.invoke_target.clone(),
                        scheduled_time: decision.scheduled_time,
                        duration_ms,
                        error: e.to_string(),
                        detail: format!("{e:?}"),
                        occurred_at,
                    }
                }
                Err(panic) => {
                    let reason = panic_message(panic);
                    error!("任务 {} 执行过程中发生panic: {}", decision.key, reason);
                    metrics::counter!("sysjob_failed_total").increment(1);
                    JobEvent::Failed {
                        event_id: Uuid::new_v4(),
                        key: decision.key.clone(),
                        job_name: decision.job_name.clone(),
                        invoke_target: decision.invoke_target.clone(),
                        scheduled_time: decision.scheduled_time,
                        duration_ms,
                        error: reason,
                        detail: "任务体发生panic，已被调度器捕获".to_string(),
                        occurred_at,
                    }
                }
            };
            let _ = event_tx.send(event);

            decision.running.fetch_sub(1, Ordering::SeqCst);
            in_flight.fetch_sub(1, Ordering::SeqCst);
        });
    }

    fn emit(&self, event: JobEvent) {
        // 没有订阅者不算错误
        let _ = self.event_tx.send(event);
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "未知panic".to_string()
    }
}
