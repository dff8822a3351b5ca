use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Cancels the shared monitor token on SIGTERM or Ctrl-C.
#[derive(Debug)]
pub struct ShutdownGuard {
    token: CancellationToken,
}

impl ShutdownGuard {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// The token every monitor task watches.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Spawns a task that waits for the first shutdown signal and cancels
    /// the token. Also returns if the token is cancelled by other means.
    pub fn spawn_signal_listener(&self) {
        let token = self.token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => return,
                signal = wait_for_signal() => {
                    tracing::info!(signal, "shutdown requested, finishing current ticks");
                }
            }
            token.cancel();
        });
    }
}

impl Default for ShutdownGuard {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
async fn wait_for_signal() -> &'static str {
    match signal::unix::signal(signal::unix::SignalKind::terminate()) {
        Ok(mut sigterm) => tokio::select! {
            _ = sigterm.recv() => "SIGTERM",
            _ = signal::ctrl_c() => "SIGINT",
        },
        Err(e) => {
            tracing::warn!(error = %e, "failed to register SIGTERM handler");
            let _ = signal::ctrl_c().await;
            "SIGINT"
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> &'static str {
    let _ = signal::ctrl_c().await;
    "Ctrl+C"
}
