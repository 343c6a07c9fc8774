//! Cancellation and deadline context for storage calls
//!
//! Every storage operation takes a [`Context`]. Backend requests are raced
//! against the context's cancellation token and deadline; whichever finishes
//! first wins, and the losing request future is dropped, which aborts it.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::errors::{Result, StorageError};

/// Cancellation token plus an optional deadline.
#[derive(Debug, Clone, Default)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    /// A fresh context with no deadline.
    pub fn new() -> Self {
        Self::default()
    }

    /// A child context that is cancelled with this one but can also be
    /// cancelled on its own.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// A child context that expires after `timeout`.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// A child context that expires at `deadline`, or earlier if this
    /// context's own deadline comes first.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(current) if current < deadline => current,
            _ => deadline,
        };
        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
        }
    }

    /// Cancel this context and all of its children.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Fails if the context is already cancelled or expired.
    pub fn check(&self) -> Result<()> {
        if self.token.is_cancelled() {
            return Err(StorageError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if deadline <= Instant::now() => Err(StorageError::DeadlineExceeded),
            _ => Ok(()),
        }
    }

    /// Drive `fut` to completion unless the context is cancelled or its
    /// deadline passes first.
    pub async fn run<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.check()?;

        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(StorageError::Cancelled),
            _ = expired(self.deadline) => Err(StorageError::DeadlineExceeded),
            result = fut => result,
        }
    }
}

async fn expired(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
