//! Cancellation and deadline propagation
//!
//! Every provider call receives a [`Context`]. The plugin server owns a root
//! context that is cancelled when Terraform sends StopProvider; request
//! contexts derived from it observe that cancellation as well as their own
//! deadline.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time;

/// Context carries cancellation and an optional deadline across async boundaries.
/// Pass it as the first parameter to every async trait method.
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    deadline: Option<Instant>,
    done: watch::Receiver<bool>,
    done_tx: watch::Sender<bool>,
}

impl Context {
    pub fn new() -> Self {
        let (done_tx, done_rx) = watch::channel(false);

        Self {
            inner: Arc::new(ContextInner {
                deadline: None,
                done: done_rx,
                done_tx,
            }),
        }
    }

    /// Derive a child context that is cancelled when `timeout` elapses or when
    /// this context is cancelled, whichever happens first.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let deadline = match (Instant::now().checked_add(timeout), self.inner.deadline) {
            (Some(own), Some(parent)) => Some(own.min(parent)),
            (own, parent) => own.or(parent),
        };
        self.child(deadline)
    }

    /// Derive a child context that follows this context's cancellation and
    /// can be cancelled on its own.
    pub fn child_context(&self) -> Self {
        self.child(self.inner.deadline)
    }

    fn child(&self, deadline: Option<Instant>) -> Self {
        let (done_tx, done_rx) = watch::channel(*self.inner.done.borrow());

        let tx = done_tx.clone();
        let mut parent = self.done();
        tokio::spawn(async move {
            let expired = async {
                match deadline {
                    Some(d) => time::sleep_until(d.into()).await,
                    None => std::future::pending::<()>().await,
                }
            };
            // A dropped parent can no longer be cancelled; only its deadline
            // (already folded into ours) still applies.
            let parent_cancelled = async {
                if parent.wait_for(|cancelled| *cancelled).await.is_err() {
                    std::future::pending::<()>().await;
                }
            };
            tokio::select! {
                _ = expired => {}
                _ = parent_cancelled => {}
                _ = tx.closed() => return,
            }
            let _ = tx.send(true);
        });

        Self {
            inner: Arc::new(ContextInner {
                deadline,
                done: done_rx,
                done_tx,
            }),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.done.borrow()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Returns a receiver that flips to `true` when work done on behalf of
    /// this context should stop.
    pub fn done(&self) -> watch::Receiver<bool> {
        self.inner.done.clone()
    }

    /// Resolves once the context is cancelled.
    pub async fn cancelled(&self) {
        let mut done = self.done();
        let _ = done.wait_for(|cancelled| *cancelled).await;
    }

    pub fn cancel(&self) {
        let _ = self.inner.done_tx.send(true);
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("deadline", &self.inner.deadline)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    #[tokio::test]
    async fn context_timeout_cancels() {
        let ctx = Context::new().with_timeout(Duration::from_millis(100));

        assert!(!ctx.is_cancelled());

        sleep(Duration::from_millis(200)).await;

        assert!(ctx.is_cancelled());
    }

    #[tokio::test]
    async fn context_manual_cancel() {
        let ctx = Context::new();

        assert!(!ctx.is_cancelled());

        ctx.cancel();

        assert!(ctx.is_cancelled());
    }

    #[tokio::test]
    async fn context_deadline() {
        let ctx = Context::new();
        assert!(ctx.deadline().is_none());

        let ctx_with_timeout = ctx.with_timeout(Duration::from_secs(1));
        assert!(ctx_with_timeout.deadline().is_some());
    }

    #[tokio::test]
    async fn child_deadline_never_exceeds_parent() {
        let parent = Context::new().with_timeout(Duration::from_secs(1));
        let child = parent.with_timeout(Duration::from_secs(60));
        assert_eq!(child.deadline(), parent.deadline());
    }

    #[tokio::test]
    async fn unbounded_timeout_keeps_parent_deadline() {
        assert!(Context::new().with_timeout(Duration::MAX).deadline().is_none());

        let parent = Context::new().with_timeout(Duration::from_secs(1));
        assert_eq!(parent.with_timeout(Duration::MAX).deadline(), parent.deadline());
    }

    #[tokio::test]
    async fn parent_cancel_reaches_children() {
        let root = Context::new();
        let child = root.child_context();
        let grandchild = child.with_timeout(Duration::from_secs(60));

        root.cancel();

        tokio::time::timeout(Duration::from_secs(1), grandchild.cancelled())
            .await
            .expect("grandchild should observe cancellation");
        assert!(child.is_cancelled());
    }

    #[tokio::test]
    async fn child_cancel_does_not_reach_parent() {
        let root = Context::new();
        let child = root.child_context();

        child.cancel();
        sleep(Duration::from_millis(20)).await;

        assert!(child.is_cancelled());
        assert!(!root.is_cancelled());
    }
}
