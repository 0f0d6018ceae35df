// Cooperative cancellation for long-running similarity scans and k-means runs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Returned by an analysis loop that observed a tripped token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("operation cancelled")]
pub struct Cancelled;

/// Shared flag checked by analysis loops between units of work.
///
/// Clones share the same flag, so the token can be handed to a worker while
/// the caller keeps a handle to trip it.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once the token has been tripped.
    pub fn check(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Check an optional token; `None` never cancels.
pub(crate) fn check(token: Option<&CancellationToken>) -> Result<(), Cancelled> {
    match token {
        Some(t) => t.check(),
        None => Ok(()),
    }
}
