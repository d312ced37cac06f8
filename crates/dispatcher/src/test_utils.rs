pub mod handlers {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use sysjob_domain::{SchedulerError, SchedulerResult};

    use crate::handlers::{JobContext, JobHandler, PoolKind};

    /// 什么都不做的处理器
    pub struct NoopHandler {
        name: String,
    }

    impl NoopHandler {
        pub fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
            }
        }
    }

    #[async_trait]
    impl JobHandler for NoopHandler {
        async fn execute(&self, _ctx: JobContext) -> SchedulerResult<Option<String>> {
            Ok(None)
        }

        fn name(&self) -> &str {
            &self.name
        }
    }

    /// 记录执行次数的处理器
    pub struct CountingHandler {
        name: String,
        executions: AtomicUsize,
        pool: PoolKind,
    }

    impl CountingHandler {
        pub fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                executions: AtomicUsize::new(0),
                pool: PoolKind::Default,
            }
        }

        /// 声明为重型任务，走专用工作池
        pub fn heavy(name: &str) -> Self {
            Self {
                name: name.to_string(),
                executions: AtomicUsize::new(0),
                pool: PoolKind::Heavy,
            }
        }

        pub fn executions(&self) -> usize {
            self.executions.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl JobHandler for CountingHandler {
        async fn execute(&self, _ctx: JobContext) -> SchedulerResult<Option<String>> {
            self.executions.fetch_add(1, Ordering::SeqCst);
            Ok(Some("done".to_string()))
        }

        fn name(&self) -> &str {
            &self.name
        }

        fn pool(&self) -> PoolKind {
            self.pool
        }
    }

    /// 总是失败的处理器
    pub struct FailingHandler {
        name: String,
    }

    impl FailingHandler {
        pub fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
            }
        }
    }

    #[async_trait]
    impl JobHandler for FailingHandler {
        async fn execute(&self, _ctx: JobContext) -> SchedulerResult<Option<String>> {
            Err(SchedulerError::execution_error("模拟的任务失败"))
        }

        fn name(&self) -> &str {
            &self.name
        }
    }
}
