//! 优雅关闭
//!
//! Ctrl+C / SIGTERM 取消 CancellationToken；优化循环在每个挂起点与该 token 竞争，
//! 被取消时停止 trial 并返回当前最优结果。

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

/// 持有交给 OptimizationController 的取消 token，并负责把系统信号转成取消
#[derive(Clone, Default)]
pub struct ShutdownManager {
    token: CancellationToken,
}

impl ShutdownManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// 取消优化运行；重复调用无副作用
    pub fn trigger(&self, source: &str) {
        if !self.token.is_cancelled() {
            tracing::info!("Received {}, stopping optimization after the current step...", source);
            self.token.cancel();
        }
    }

    /// 安装系统信号处理器 (Ctrl+C, SIGTERM)
    pub fn install_signal_handlers(self: &Arc<Self>) {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                manager.trigger("Ctrl+C");
            }
        });

        #[cfg(unix)]
        {
            let manager = Arc::clone(self);
            tokio::spawn(async move {
                use tokio::signal::unix::{signal, SignalKind};
                if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                    sigterm.recv().await;
                    manager.trigger("SIGTERM");
                }
            });
        }
    }
}
