//! Cooperative cancellation.
//!
//! A [`CancellationSignal`] is shared between the resolver, the poller and
//! whatever triggers shutdown (a Ctrl-C handler, a supervising task). Every
//! wait in the crate goes through [`CancellationSignal::wait`] so that a raised
//! signal interrupts it immediately instead of after the full interval.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

use crate::error::{Error, Result};

/// A cloneable, one-shot cancellation flag.
#[derive(Debug, Clone)]
pub struct CancellationSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl CancellationSignal {
    /// Create a new, un-raised signal.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Raise the signal. Calling this more than once has no further effect.
    pub fn cancel(&self) {
        let was_cancelled = self.tx.send_replace(true);
        if !was_cancelled {
            debug!("Cancellation requested");
        }
    }

    /// Check if the signal has been raised.
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Return `Err(Error::Cancelled)` if the signal has been raised.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolve once the signal is raised.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    /// Wait for `duration`, or until the signal is raised.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] if the signal is raised before or during
    /// the wait.
    pub async fn wait(&self, duration: Duration) -> Result<()> {
        self.check()?;

        tokio::select! {
            _ = self.cancelled() => Err(Error::Cancelled),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}

impl Default for CancellationSignal {
    fn default() -> Self {
        Self::new()
    }
}
