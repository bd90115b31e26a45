//! Cooperative cancellation.
//!
//! A [`CancelHandle`] flips a `watch` channel that any number of
//! [`CancelSignal`] clones observe. Operations race their in-flight I/O
//! against [`CancelSignal::cancelled`] and return [`VouchError::Cancelled`].

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use vouch_core::{VouchError, VouchResult};

/// Sending half: cancels every signal cloned from its pair.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

/// Receiving half, cheap to clone.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

/// Create a connected handle and signal.
pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelSignal { rx })
}

/// Resolve on Ctrl-C, or SIGTERM on unix.
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "SIGTERM handler unavailable, waiting on Ctrl-C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

impl CancelHandle {
    /// Cancel now. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// Cancel after `delay` from a background task.
    pub fn cancel_after(&self, delay: Duration) {
        let handle = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            handle.cancel();
        });
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn signal(&self) -> CancelSignal {
        CancelSignal {
            rx: self.tx.subscribe(),
        }
    }
}

impl CancelSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once cancelled. Pends forever if the handle is dropped
    /// without cancelling.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    /// Run `fut` unless cancellation wins the race first.
    pub async fn run<T, F>(&self, fut: F) -> VouchResult<T>
    where
        F: Future<Output = VouchResult<T>>,
    {
        if self.is_cancelled() {
            return Err(VouchError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(VouchError::Cancelled),
            result = fut => result,
        }
    }
}
