//! 任务生命周期监听器
//!
//! 订阅调度核心的事件通道，把执行失败转换为执行日志写入外部日志
//! 仓储。默认只记录失败：提交、成功、错过、移除事件仅打日志。
//! 写日志失败不会向调度循环传播，单个任务的问题不影响其他任务。

use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info, warn};

use sysjob_domain::{ExecutionLogRepository, JobEvent, JobExecutionLog};

/// 异常信息截断长度，与日志表字段宽度保持一致
const EXCEPTION_INFO_MAX_CHARS: usize = 2000;

pub struct JobLogListener {
    log_repo: Arc<dyn ExecutionLogRepository>,
    receiver: Mutex<broadcast::Receiver<JobEvent>>,
}

impl JobLogListener {
    pub fn new(
        log_repo: Arc<dyn ExecutionLogRepository>,
        receiver: broadcast::Receiver<JobEvent>,
    ) -> Self {
        Self {
            log_repo,
            receiver: Mutex::new(receiver),
        }
    }

    /// 消费事件直到通道关闭
    pub async fn listen(&self) {
        info!("任务生命周期监听器已启动");
        let mut receiver = self.receiver.lock().await;
        loop {
            match receiver.recv().await {
                Ok(event) => self.process_event(event).await,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("事件通道积压，丢弃了 {} 条事件", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    info!("事件通道已关闭，监听器退出");
                    break;
                }
            }
        }
    }

    /// 处理通道中尚未消费的事件
    ///
    /// 关闭流程里调度器先排空在途任务，监听器随后用它把已广播但
    /// 还没来得及消费的事件落盘，保证失败日志不丢。
    pub async fn drain(&self) {
        let mut receiver = self.receiver.lock().await;
        loop {
            match receiver.try_recv() {
                Ok(event) => self.process_event(event).await,
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!("事件通道积压，丢弃了 {} 条事件", skipped);
                }
                Err(_) => break,
            }
        }
    }

    async fn process_event(&self, event: JobEvent) {
        match event {
            JobEvent::Failed {
                key,
                job_name,
                invoke_target,
                duration_ms,
                error,
                detail,
                ..
            } => {
                let exception_info: String =
                    error.chars().take(EXCEPTION_INFO_MAX_CHARS).collect();
                let job_message = format!(
                    "任务执行失败，耗时 {duration_ms} 毫秒。{detail}"
                );
                let log = JobExecutionLog::failure(
                    &job_name,
                    &key.job_group,
                    &invoke_target,
                    job_message,
                    exception_info,
                );
                if let Err(e) = self.log_repo.insert(&log).await {
                    // 日志落库失败只记录，不影响调度
                    error!("写入任务 {} 的执行日志失败: {}", key, e);
                }
            }
            other => {
                debug!(
                    "任务 {} 生命周期事件: {}",
                    other.key(),
                    other.event_type()
                );
            }
        }
    }
}
