//! 嵌入式调度端到端测试
//!
//! 用内存仓储把整个应用拉起来，走真实时钟与秒级cron验证调度行为。

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;

use sysjob::{
    AppConfig, Application, JobContext, JobHandler, JobStatus, SchedulerError, SchedulerResult,
    ShutdownManager,
};
use sysjob_testing_utils::{
    JobDefinitionBuilder, MemoryExecutionLogRepository, MemoryJobRepository,
    StaticApplicationContext,
};

/// 可注入延迟与失败的观测处理器
struct TrackingHandler {
    name: String,
    delay: Duration,
    fail: bool,
    executions: AtomicUsize,
    current: AtomicUsize,
    max_concurrent: AtomicUsize,
    completed: AtomicUsize,
}

impl TrackingHandler {
    fn new(name: &str, delay: Duration, fail: bool) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            delay,
            fail,
            executions: AtomicUsize::new(0),
            current: AtomicUsize::new(0),
            max_concurrent: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
        })
    }

    fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }

    fn max_concurrent(&self) -> usize {
        self.max_concurrent.load(Ordering::SeqCst)
    }

    fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobHandler for TrackingHandler {
    async fn execute(&self, _ctx: JobContext) -> SchedulerResult<Option<String>> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        let concurrent = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent.fetch_max(concurrent, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        self.current.fetch_sub(1, Ordering::SeqCst);
        self.completed.fetch_add(1, Ordering::SeqCst);

        if self.fail {
            Err(SchedulerError::execution_error("注入的任务失败"))
        } else {
            Ok(Some("ok".to_string()))
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

struct TestBed {
    app: Arc<Application>,
    job_repo: Arc<MemoryJobRepository>,
    log_repo: Arc<MemoryExecutionLogRepository>,
}

async fn build_app(handlers: Vec<Arc<dyn JobHandler>>) -> TestBed {
    let mut config = AppConfig::default();
    config.scheduler.tick_interval_ms = 100;
    config.scheduler.shutdown_timeout_seconds = 5;

    let job_repo = Arc::new(MemoryJobRepository::new());
    let log_repo = Arc::new(MemoryExecutionLogRepository::new());
    let app = Arc::new(Application::new(
        config,
        job_repo.clone(),
        log_repo.clone(),
        Arc::new(StaticApplicationContext::new("test")),
    ));
    for handler in handlers {
        app.register_handler(handler).await;
    }
    TestBed {
        app,
        job_repo,
        log_repo,
    }
}

async fn start_app(app: &Arc<Application>) -> (ShutdownManager, JoinHandle<()>) {
    let manager = ShutdownManager::new();
    let shutdown_rx = manager.subscribe();
    let app = Arc::clone(app);
    let handle = tokio::spawn(async move {
        app.run(shutdown_rx).await.expect("应用运行失败");
    });
    // 给初始化与调度循环启动留出时间
    tokio::time::sleep(Duration::from_millis(150)).await;
    (manager, handle)
}

async fn wait_until(timeout_ms: u64, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_millis(timeout_ms);
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

#[tokio::test]
async fn test_forbidden_concurrency_never_overlaps() {
    // 任务体 2.2 秒，计划每秒触发：禁止并发时重叠的触发被跳过而不是排队
    let handler = TrackingHandler::new("tasks.itest.slow", Duration::from_millis(2200), false);
    let bed = build_app(vec![handler.clone()]).await;
    let (manager, handle) = start_app(&bed.app).await;

    let mut job = JobDefinitionBuilder::new()
        .with_name("slow_job")
        .with_invoke_target("tasks.itest.slow")
        .with_cron("* * * * * *")
        .build();
    bed.app.service().insert_job(&mut job).await.unwrap();

    tokio::time::sleep(Duration::from_secs(5)).await;
    manager.shutdown();
    handle.await.unwrap();

    assert_eq!(handler.max_concurrent(), 1, "同一任务不允许并发实例");
    let executions = handler.executions();
    assert!(
        (1..=3).contains(&executions),
        "5秒窗口内执行次数应为1~3次，实际 {executions}"
    );

    // 被跳过的触发不会在之后补偿执行
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(handler.executions(), executions);
}

#[tokio::test]
async fn test_paused_job_waits_for_resume() {
    let handler = TrackingHandler::new("tasks.itest.paused", Duration::ZERO, false);
    let bed = build_app(vec![handler.clone()]).await;

    // 启动前就存在一个暂停状态的任务定义
    let job = JobDefinitionBuilder::new()
        .with_id(1)
        .with_name("paused_job")
        .with_invoke_target("tasks.itest.paused")
        .with_cron("* * * * * *")
        .with_status(JobStatus::Paused)
        .build();
    bed.job_repo.seed(vec![job.clone()]);

    let (manager, handle) = start_app(&bed.app).await;

    // 初始化后任务存在于运行态存储中，但从不触发
    assert!(bed.app.scheduler().has_job(&job.job_key()).await);
    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert_eq!(handler.executions(), 0, "暂停的任务不应触发");

    // 恢复之后开始正常触发
    let mut resumed = bed.job_repo.find(1).unwrap();
    bed.app.service().resume_job(&mut resumed).await.unwrap();
    assert!(
        wait_until(3000, || handler.executions() >= 1).await,
        "恢复后的任务应在下一个触发点执行"
    );

    manager.shutdown();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_insert_unresolvable_target_leaves_nothing_behind() {
    let bed = build_app(vec![]).await;

    let mut job = JobDefinitionBuilder::new()
        .with_invoke_target("tasks.itest.nowhere")
        .build();
    let err = bed.app.service().insert_job(&mut job).await.unwrap_err();
    assert!(matches!(err, SchedulerError::TargetNotRegistered(_)));
    assert_eq!(bed.job_repo.count(), 0);
    assert_eq!(bed.app.scheduler().live_count().await, 0);
}

#[tokio::test]
async fn test_failing_job_writes_one_fail_log_per_execution() {
    let handler = TrackingHandler::new("tasks.itest.fail", Duration::ZERO, true);
    let bed = build_app(vec![handler.clone()]).await;
    let (manager, handle) = start_app(&bed.app).await;

    let mut job = JobDefinitionBuilder::new()
        .with_name("failing_job")
        .with_invoke_target("tasks.itest.fail")
        .with_cron("* * * * * *")
        .build();
    bed.app.service().insert_job(&mut job).await.unwrap();

    assert!(
        wait_until(3000, || handler.executions() >= 1).await,
        "失败任务应至少执行一次"
    );
    // 等监听器把日志写完：每次失败恰好一条日志
    let log_repo = bed.log_repo.clone();
    let observed = handler.executions();
    assert!(
        wait_until(2000, || log_repo.count() >= observed).await,
        "失败执行应产生对应的日志行"
    );

    manager.shutdown();
    handle.await.unwrap();

    let logs = bed.log_repo.clone();
    let executions = handler.executions();
    assert!(
        wait_until(2000, || logs.count() == executions).await,
        "日志行数 {} 应与失败次数 {} 一致",
        logs.count(),
        executions
    );

    use sysjob_domain::{ExecutionLogRepository, JobLogFilter};
    let rows = bed
        .log_repo
        .list_matching(&JobLogFilter::default())
        .await
        .unwrap();
    for row in rows {
        assert!(row.is_failure());
        assert!(!row.exception_info.is_empty());
        assert_eq!(row.job_group, "DEFAULT");
        assert_eq!(row.invoke_target, "tasks.itest.fail");
    }
}

#[tokio::test]
async fn test_successful_job_writes_no_log() {
    let handler = TrackingHandler::new("tasks.itest.ok", Duration::ZERO, false);
    let bed = build_app(vec![handler.clone()]).await;
    let (manager, handle) = start_app(&bed.app).await;

    let mut job = JobDefinitionBuilder::new()
        .with_name("healthy_job")
        .with_invoke_target("tasks.itest.ok")
        .with_cron("* * * * * *")
        .build();
    bed.app.service().insert_job(&mut job).await.unwrap();

    assert!(wait_until(3000, || handler.executions() >= 1).await);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(bed.log_repo.count(), 0, "成功执行默认不写日志");

    manager.shutdown();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_run_now_fires_without_touching_schedule() {
    let handler = TrackingHandler::new("tasks.itest.manual", Duration::ZERO, false);
    let bed = build_app(vec![handler.clone()]).await;
    let (manager, handle) = start_app(&bed.app).await;

    // 凌晨三点的计划在测试窗口内不会自然触发
    let mut job = JobDefinitionBuilder::new()
        .with_name("manual_job")
        .with_invoke_target("tasks.itest.manual")
        .with_cron("0 0 3 * * ?")
        .build();
    bed.app.service().insert_job(&mut job).await.unwrap();

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(handler.executions(), 0);

    bed.app.service().run_job_now(&job).await.unwrap();
    assert!(
        wait_until(2000, || handler.executions() == 1).await,
        "立即执行应在短时间内触发一次"
    );

    // 持久化的cron计划保持原样，下次触发时间回到计划轨道
    let stored = bed.job_repo.find(job.job_id).unwrap();
    assert_eq!(stored.cron_expression, "0 0 3 * * ?");
    let state = bed
        .app
        .scheduler()
        .job_state(&job.job_key())
        .await
        .unwrap();
    assert!(state.next_fire_time.unwrap() > chrono::Utc::now());

    manager.shutdown();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_shutdown_drains_in_flight_job() {
    let handler = TrackingHandler::new("tasks.itest.drain", Duration::from_millis(1500), false);
    let bed = build_app(vec![handler.clone()]).await;
    let (manager, handle) = start_app(&bed.app).await;

    let mut job = JobDefinitionBuilder::new()
        .with_name("drain_job")
        .with_invoke_target("tasks.itest.drain")
        .with_cron("0 0 3 * * ?")
        .build();
    bed.app.service().insert_job(&mut job).await.unwrap();
    bed.app.service().run_job_now(&job).await.unwrap();

    assert!(
        wait_until(2000, || handler.executions() == 1).await,
        "任务应已开始执行"
    );
    manager.shutdown();
    handle.await.unwrap();

    // 优雅关闭等待在途任务跑完
    assert_eq!(handler.completed(), 1);
}
