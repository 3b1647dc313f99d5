// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 podrun contributors

//! Cancellable execution context
//!
//! One token per run with two independent triggers: the pipeline
//! deadline and an operating system signal. Whichever fires first is
//! recorded; later triggers are no-ops.

use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Why a run was cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    Timeout,
    Signal,
    Requested,
}

impl std::fmt::Display for CancelReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout"),
            Self::Signal => write!(f, "signal"),
            Self::Requested => write!(f, "requested"),
        }
    }
}

/// Execution context shared by the driver and its step tasks
#[derive(Debug, Clone)]
pub struct ExecContext {
    token: CancellationToken,
    reason: Arc<OnceLock<CancelReason>>,
}

impl ExecContext {
    /// Create a context with no triggers attached
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            reason: Arc::new(OnceLock::new()),
        }
    }

    /// Create a context that cancels itself once `timeout` elapses.
    ///
    /// Must be called inside a tokio runtime. `None` disables the deadline.
    pub fn with_timeout(timeout: Option<Duration>) -> Self {
        let ctx = Self::new();
        if let Some(timeout) = timeout {
            let deadline = ctx.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = deadline.token.cancelled() => {}
                    _ = tokio::time::sleep(timeout) => {
                        warn!(timeout_secs = timeout.as_secs(), "pipeline timeout exceeded");
                        deadline.cancel(CancelReason::Timeout);
                    }
                }
            });
        }
        ctx
    }

    /// Cancel on SIGINT or SIGTERM
    pub fn listen_for_signals(&self) {
        let ctx = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = ctx.token.cancelled() => {}
                _ = shutdown_signal() => {
                    eprintln!("received signal, terminating process");
                    ctx.cancel(CancelReason::Signal);
                }
            }
        });
    }

    /// Cancel the context. Returns false if it was already cancelled.
    pub fn cancel(&self, reason: CancelReason) -> bool {
        let first = self.reason.set(reason).is_ok();
        if first {
            info!(%reason, "execution cancelled");
        }
        self.token.cancel();
        first
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the context is cancelled
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// The first trigger that fired
    pub fn reason(&self) -> Option<CancelReason> {
        self.reason.get().copied()
    }
}

impl Default for ExecContext {
    fn default() -> Self {
        Self::new()
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!("failed to install Ctrl+C handler: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                warn!("failed to install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_is_idempotent() {
        let ctx = ExecContext::new();
        assert!(ctx.cancel(CancelReason::Signal));
        assert!(!ctx.cancel(CancelReason::Timeout));
        assert!(ctx.is_cancelled());
        assert_eq!(ctx.reason(), Some(CancelReason::Signal));
    }

    #[test]
    fn test_clones_share_cancellation() {
        let ctx = ExecContext::new();
        let other = ctx.clone();
        other.cancel(CancelReason::Requested);
        assert!(ctx.is_cancelled());
    }

    #[tokio::test]
    async fn test_timeout_cancels() {
        let ctx = ExecContext::with_timeout(Some(Duration::from_millis(20)));
        tokio::time::timeout(Duration::from_secs(2), ctx.cancelled())
            .await
            .unwrap();
        assert_eq!(ctx.reason(), Some(CancelReason::Timeout));
    }

    #[tokio::test]
    async fn test_no_timeout() {
        let ctx = ExecContext::with_timeout(None);
        let waited = tokio::time::timeout(Duration::from_millis(30), ctx.cancelled()).await;
        assert!(waited.is_err());
        assert!(!ctx.is_cancelled());
    }
}
