//! 应用组合根
//!
//! 注册表、调度器、监听器与服务层在这里一次性组装成一个持有型
//! 上下文，仓储实现由宿主注入；不依赖任何进程级全局变量。

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use sysjob_dispatcher::{HandlerRegistry, JobHandler, JobLogListener, JobScheduler, JobService};
use sysjob_domain::{ApplicationContext, ExecutionLogRepository, JobRepository};

use crate::config::AppConfig;

/// 初始化日志系统
pub fn init_logging(log_level: &str, log_format: &str) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(env_filter);

    match log_format {
        "json" => {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .try_init()
                .context("初始化JSON日志格式失败")?;
        }
        "pretty" => {
            registry
                .with(tracing_subscriber::fmt::layer().pretty())
                .try_init()
                .context("初始化Pretty日志格式失败")?;
        }
        _ => {
            return Err(anyhow::anyhow!("不支持的日志格式: {log_format}"));
        }
    }

    Ok(())
}

/// 主应用程序
pub struct Application {
    config: AppConfig,
    registry: Arc<HandlerRegistry>,
    scheduler: Arc<JobScheduler>,
    service: Arc<JobService>,
    listener: Arc<JobLogListener>,
}

impl Application {
    /// 创建应用实例
    ///
    /// 任务定义仓储、执行日志仓储与应用上下文由宿主提供。
    pub fn new(
        config: AppConfig,
        job_repo: Arc<dyn JobRepository>,
        log_repo: Arc<dyn ExecutionLogRepository>,
        app_context: Arc<dyn ApplicationContext>,
    ) -> Self {
        let registry = Arc::new(HandlerRegistry::new(
            config.scheduler.allowed_target_prefixes.clone(),
        ));
        let scheduler = Arc::new(
            JobScheduler::builder(Arc::clone(&registry), app_context)
                .tick_interval(Duration::from_millis(config.scheduler.tick_interval_ms))
                .worker_pool_size(config.scheduler.worker_pool_size)
                .heavy_pool_size(config.scheduler.heavy_pool_size)
                .event_capacity(config.scheduler.event_channel_capacity)
                .build(),
        );
        let listener = Arc::new(JobLogListener::new(log_repo, scheduler.subscribe()));
        let service = Arc::new(JobService::new(job_repo, Arc::clone(&scheduler)));

        Self {
            config,
            registry,
            scheduler,
            service,
            listener,
        }
    }

    /// 注册任务处理器，必须在 `run` 之前完成
    pub async fn register_handler(&self, handler: Arc<dyn JobHandler>) {
        self.registry.register(handler).await;
    }

    pub fn service(&self) -> Arc<JobService> {
        Arc::clone(&self.service)
    }

    pub fn scheduler(&self) -> Arc<JobScheduler> {
        Arc::clone(&self.scheduler)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// 启动全部组件并等待关闭信号
    ///
    /// 初始化失败（包括无法解析调用目标的持久化任务）直接返回错误，
    /// 不会进入调度循环。
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        self.service.init().await.context("任务初始化失败")?;
        self.scheduler.start().await.context("启动调度循环失败")?;

        let listener = Arc::clone(&self.listener);
        let mut listener_shutdown = shutdown_rx.resubscribe();
        let listener_handle = tokio::spawn(async move {
            tokio::select! {
                _ = listener.listen() => {}
                _ = listener_shutdown.recv() => {
                    info!("生命周期监听器收到关闭信号");
                }
            }
        });

        let _ = shutdown_rx.recv().await;
        info!("应用收到关闭信号，开始优雅关闭...");

        self.scheduler
            .shutdown(Duration::from_secs(
                self.config.scheduler.shutdown_timeout_seconds,
            ))
            .await;
        if let Err(e) = listener_handle.await {
            error!("生命周期监听器异常退出: {e}");
        }
        // 调度器已排空在途任务，补上通道里残留的事件
        self.listener.drain().await;

        info!("应用已停止");
        Ok(())
    }
}
