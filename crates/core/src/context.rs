//! Call context: cancellation and deadlines threaded through every call.
//!
//! A [`Context`] is a cheap, cloneable handle. The same context is passed
//! to every child of a composite; derived contexts (`with_cancel`,
//! `with_timeout`) are cancelled when their parent is, never the reverse.

use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::ContextError;

#[derive(Debug, Clone, Default)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    /// A fresh root context that is never done until cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive a child context that can be cancelled independently.
    pub fn with_cancel(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Derive a child context that expires after `timeout`.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Derive a child context that expires at `deadline`. An earlier parent
    /// deadline still wins.
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

    /// Cancel this context and everything derived from it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Why the context is done, or `None` while it is still live.
    pub fn err(&self) -> Option<ContextError> {
        if self.token.is_cancelled() {
            return Some(ContextError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(ContextError::DeadlineExceeded),
            _ => None,
        }
    }

    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Resolves once the context is cancelled or its deadline passes.
    pub async fn done(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.token.cancelled() => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => self.token.cancelled().await,
        }
    }

    /// The underlying token, for `select!`-ing against other work.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_context_is_live() {
        let ctx = Context::new();
        assert!(!ctx.is_done());
        assert_eq!(ctx.err(), None);
    }

    #[test]
    fn cancel_propagates_to_children_only() {
        let parent = Context::new();
        let child = parent.with_cancel();
        child.cancel();
        assert_eq!(child.err(), Some(ContextError::Cancelled));
        assert!(!parent.is_done());

        let other = parent.with_cancel();
        parent.cancel();
        assert!(other.is_done());
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_expires() {
        let ctx = Context::new().with_timeout(Duration::from_millis(50));
        assert!(!ctx.is_done());
        ctx.done().await;
        assert_eq!(ctx.err(), Some(ContextError::DeadlineExceeded));
    }

    #[tokio::test(start_paused = true)]
    async fn earlier_parent_deadline_wins() {
        let parent = Context::new().with_timeout(Duration::from_millis(10));
        let child = parent.with_timeout(Duration::from_secs(60));
        assert_eq!(child.deadline(), parent.deadline());
    }

    #[tokio::test]
    async fn done_resolves_on_cancel() {
        let ctx = Context::new();
        let waiter = ctx.clone();
        let handle = tokio::spawn(async move { waiter.done().await });
        ctx.cancel();
        handle.await.unwrap();
        assert!(ctx.is_done());
    }
}
