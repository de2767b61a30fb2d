//! 进程关闭信号
//!
//! 无人值守运行时通常由 systemd / docker 发送 SIGTERM 停止，
//! 与 Ctrl-C 一样要走调度器的落盘流程。

use crate::common::Result;
use tracing::warn;

/// 已注册的关闭信号
///
/// SIGTERM 的处理器在 `install` 时立即注册，之后到达的信号不会走默认的直接退出。
pub struct ShutdownSignal {
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

impl ShutdownSignal {
    pub fn install() -> Result<Self> {
        Ok(Self {
            #[cfg(unix)]
            terminate: tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?,
        })
    }

    /// 等待 Ctrl-C 或 SIGTERM，返回收到的信号名
    pub async fn recv(self) -> &'static str {
        let ctrl_c = async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => "SIGINT",
                Err(e) => {
                    warn!(target: "应用生命周期", error = %e, "监听Ctrl-C失败");
                    std::future::pending::<&'static str>().await
                }
            }
        };

        #[cfg(unix)]
        let terminate = async move {
            let mut terminate = self.terminate;
            match terminate.recv().await {
                Some(()) => "SIGTERM",
                None => std::future::pending::<&'static str>().await,
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<&'static str>();

        tokio::select! {
            name = ctrl_c => name,
            name = terminate => name,
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_sigterm_resolves_shutdown_signal() {
        let signal = ShutdownSignal::install().unwrap();
        let status = std::process::Command::new("kill")
            .arg("-TERM")
            .arg(std::process::id().to_string())
            .status()
            .unwrap();
        assert!(status.success());

        let name = tokio::time::timeout(Duration::from_secs(5), signal.recv())
            .await
            .expect("SIGTERM 未被捕获");
        assert_eq!(name, "SIGTERM");
    }
}
