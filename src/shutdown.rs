//! Process-wide shutdown signal.
//!
//! A single [`Shutdown`] handle is created at startup and cloned into every
//! long-lived task. The signal fires once: either an OS signal arrives or
//! some task calls [`Shutdown::trigger`] (fatal startup errors do this).

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Clonable handle to the process-wide cancellation signal.
#[derive(Clone, Default)]
pub struct Shutdown {
    token: CancellationToken,
}

impl Shutdown {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Fires the signal. Safe to call more than once.
    pub fn trigger(&self) {
        self.token.cancel();
    }

    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the signal has fired.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    /// Spawns the OS signal listener. Interrupt (ctrl-c) and terminate are
    /// caught; kill and quit are not.
    pub fn listen_for_signals(&self) {
        let token = self.token.clone();
        tokio::spawn(async move {
            wait_for_signal(&token).await;
            token.cancel();
        });
    }
}

#[cfg(unix)]
async fn wait_for_signal(token: &CancellationToken) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(e) => {
            error!("cannot install terminate handler: {}", e);
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("shutting down by break"),
        _ = sigterm.recv() => info!("shutting down by process termination"),
        _ = token.cancelled() => info!("shutting down by cancel"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal(token: &CancellationToken) {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("shutting down by break"),
        _ = token.cancelled() => info!("shutting down by cancel"),
    }
}
