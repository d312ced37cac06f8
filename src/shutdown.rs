//! 优雅关闭
//!
//! 关闭信号通过广播通道分发，各组件各自订阅；宿主可以用
//! [`wait_for_shutdown_signal`] 把 Ctrl+C / SIGTERM 接到这条链路上。

use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info};

/// 优雅关闭管理器
pub struct ShutdownManager {
    tx: broadcast::Sender<()>,
}

impl ShutdownManager {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// 触发关闭，所有订阅者都会收到信号
    pub fn shutdown(&self) {
        let _ = self.tx.send(());
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}

/// 等待进程级关闭信号
pub async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.unwrap_or_else(|e| {
            error!("安装Ctrl+C信号处理器失败: {}", e);
            std::process::exit(1);
        })
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => signal.recv().await,
            Err(e) => {
                error!("安装SIGTERM信号处理器失败: {}", e);
                std::process::exit(1);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("收到Ctrl+C信号");
        },
        _ = terminate => {
            info!("收到SIGTERM信号");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shutdown_reaches_all_subscribers() {
        let manager = ShutdownManager::new();
        let mut first = manager.subscribe();
        let mut second = manager.subscribe();

        manager.shutdown();
        assert!(first.recv().await.is_ok());
        assert!(second.recv().await.is_ok());
    }
}
