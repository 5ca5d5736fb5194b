//! 优雅关闭处理
//!
//! 监听 Ctrl+C / SIGTERM，触发后：停止接收新目标、取消正在执行的目标（走 Abort 路径，不再下发运动指令），
//! 等待任务服务的 worker 退出。

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::server::TaskServer;

/// 关闭信号管理器：关闭 token + 首次触发的原因
#[derive(Clone)]
pub struct ShutdownManager {
    shutdown_token: CancellationToken,
    reason: Arc<watch::Sender<Option<ShutdownReason>>>,
}

/// 关闭原因
#[derive(Debug, Clone, PartialEq)]
pub enum ShutdownReason {
    /// Ctrl+C
    UserInitiated,
    /// SIGTERM 信号
    Signal,
}

impl ShutdownManager {
    pub fn new() -> Self {
        let (reason, _) = watch::channel(None);
        Self {
            shutdown_token: CancellationToken::new(),
            reason: Arc::new(reason),
        }
    }

    /// 关闭 token；任务服务以它为父 token 派生每个目标的取消 token
    pub fn token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// 触发关闭；重复触发时保留第一次的原因
    pub fn shutdown(&self, reason: ShutdownReason) {
        self.reason.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        });
        self.shutdown_token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    /// 关闭原因；仅通过 token 取消（未调用 `shutdown`）时为 None
    pub fn reason(&self) -> Option<ShutdownReason> {
        self.reason.borrow().clone()
    }

    pub async fn wait_for_shutdown(&self) {
        self.shutdown_token.cancelled().await;
    }

    /// 安装系统信号处理器 (Ctrl+C, SIGTERM)
    pub fn install_signal_handlers(self: &Arc<Self>) {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            if let Ok(()) = tokio::signal::ctrl_c().await {
                tracing::info!("Received Ctrl+C, preempting active goal and shutting down...");
                manager.shutdown(ShutdownReason::UserInitiated);
            }
        });

        #[cfg(unix)]
        {
            let manager = Arc::clone(self);
            tokio::spawn(async move {
                use tokio::signal::unix::{signal, SignalKind};
                if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                    sigterm.recv().await;
                    tracing::info!("Received SIGTERM, preempting active goal and shutting down...");
                    manager.shutdown(ShutdownReason::Signal);
                }
            });
        }
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}

/// 运行应用直到其结束或收到关闭信号，随后关闭任务服务
///
/// 应用正常结束时返回其输出；因关闭信号中断时返回 None。
pub async fn run_with_graceful_shutdown<F>(
    shutdown_manager: Arc<ShutdownManager>,
    server: &TaskServer,
    app: F,
) -> Option<F::Output>
where
    F: Future,
{
    shutdown_manager.install_signal_handlers();

    let output = tokio::select! {
        out = app => {
            tracing::info!("Application finished normally");
            Some(out)
        }
        _ = shutdown_manager.wait_for_shutdown() => {
            tracing::info!("Shutdown signal received");
            None
        }
    };

    server.shutdown().await;
    output
}
