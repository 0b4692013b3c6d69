//! Cancellation Context
//!
//! Carries caller-controlled cancellation and an optional deadline into every
//! operation that can block. Contexts form a tree: cancelling a parent
//! cancels every child derived from it, and a child's deadline never extends
//! past its parent's.

use crate::error::{CoreError, Result};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Cancellation scope passed by reference into blocking operations
#[derive(Debug, Clone, Default)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    /// Root context: never cancelled unless `cancel` is called on it
    pub fn background() -> Self {
        Self::default()
    }

    /// Child context that expires after `timeout`
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Child context that expires at `deadline` (or the parent's, if earlier)
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(parent) if parent < deadline => parent,
            _ => deadline,
        };
        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
        }
    }

    /// Child context cancelled together with this one
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Cancel this context and all of its children
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Cancelled or past the deadline
    pub fn is_done(&self) -> bool {
        self.token.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Fail fast if the context has already ended
    pub fn check(&self, operation: &str) -> Result<()> {
        if self.token.is_cancelled() {
            return Err(CoreError::cancelled(operation));
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(CoreError::deadline_exceeded(operation));
        }
        Ok(())
    }

    /// Resolves once the context ends, yielding the matching error
    ///
    /// Pending forever for a background context nobody cancels; always race it
    /// against the real work in a `select!`.
    pub async fn done(&self, operation: &str) -> CoreError {
        match self.deadline {
            Some(deadline) => tokio::select! {
                _ = self.token.cancelled() => CoreError::cancelled(operation),
                _ = tokio::time::sleep_until(deadline) => CoreError::deadline_exceeded(operation),
            },
            None => {
                self.token.cancelled().await;
                CoreError::cancelled(operation)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[tokio::test]
    async fn test_background_never_done() {
        let ctx = Context::background();
        assert!(!ctx.is_done());
        assert!(ctx.check("op").is_ok());

        let waited = tokio::time::timeout(Duration::from_millis(20), ctx.done("op")).await;
        assert!(waited.is_err());
    }

    #[tokio::test]
    async fn test_cancel_propagates_to_children() {
        let parent = Context::background();
        let child = parent.child();
        let grandchild = child.with_timeout(Duration::from_secs(60));

        parent.cancel();

        assert!(child.is_cancelled());
        assert_eq!(grandchild.check("op").unwrap_err().code(), ErrorCode::Cancelled);
        assert_eq!(grandchild.done("op").await.code(), ErrorCode::Cancelled);
    }

    #[tokio::test]
    async fn test_child_cancel_leaves_parent() {
        let parent = Context::background();
        let child = parent.child();
        child.cancel();
        assert!(!parent.is_done());
    }

    #[tokio::test]
    async fn test_deadline_expires() {
        let ctx = Context::background().with_timeout(Duration::from_millis(10));
        let err = ctx.done("receive").await;
        assert_eq!(err.code(), ErrorCode::DeadlineExceeded);
        assert!(ctx.is_done());
        assert_eq!(ctx.check("receive").unwrap_err().code(), ErrorCode::DeadlineExceeded);
    }

    #[tokio::test]
    async fn test_child_deadline_capped_by_parent() {
        let parent = Context::background().with_timeout(Duration::from_millis(50));
        let child = parent.with_timeout(Duration::from_secs(30));
        assert_eq!(child.deadline(), parent.deadline());
    }
}
