//! Cooperative cancellation for externally invoked operations.
//!
//! A [`CancelToken`] is a cheap, clonable handle shared between the caller
//! and the operation. Storage code checks it at statement boundaries; HTTP
//! code caps its request timeout to [`CancelToken::remaining`].

use crate::{Error, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Cancellation handle with an optional deadline.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    /// Creates a token that never fires on its own.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a token that fires once `timeout` has elapsed.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            deadline: Instant::now().checked_add(timeout),
        }
    }

    /// Cancels every clone of this token.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Returns true if the token was cancelled or its deadline passed.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst) || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Time left before the deadline, if one is set.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Caps `timeout` to the time left on this token.
    #[must_use]
    pub fn cap(&self, timeout: Duration) -> Duration {
        self.remaining().map_or(timeout, |left| left.min(timeout))
    }

    /// Returns [`Error::Cancelled`] if the token has fired.
    ///
    /// # Errors
    ///
    /// Returns `Error::Cancelled` naming `operation` when cancelled.
    pub fn check(&self, operation: &str) -> Result<()> {
        if self.is_cancelled() {
            return Err(Error::Cancelled(operation.to_string()));
        }
        Ok(())
    }
}
