//! Cancellation token shared between a caller and running pipelines.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::warn;

/// A callback invoked once when the token is cancelled.
pub type CancelCallback = Box<dyn Fn(&str) + Send + Sync>;

#[derive(Default)]
struct TokenState {
    cancelled: AtomicBool,
    // first reason wins
    reason: RwLock<Option<String>>,
    callbacks: RwLock<Vec<CancelCallback>>,
}

/// A cloneable token for cooperative cancellation.
///
/// Clones share state: cancelling any clone cancels all of them. Cancellation
/// is idempotent and only the first reason is kept.
#[derive(Clone, Default)]
pub struct CancellationToken {
    state: Arc<TokenState>,
}

impl CancellationToken {
    /// Creates a token that is not cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    ///
    /// Registered callbacks run synchronously on the first call. A panicking
    /// callback is logged and does not prevent the others from running.
    pub fn cancel(&self, reason: impl Into<String>) {
        if self
            .state
            .cancelled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        let reason = reason.into();
        *self.state.reason.write() = Some(reason.clone());

        let callbacks = std::mem::take(&mut *self.state.callbacks.write());
        for callback in &callbacks {
            invoke(callback.as_ref(), &reason);
        }
    }

    /// Registers a callback. Runs immediately if the token is already cancelled.
    pub fn on_cancel<F>(&self, callback: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        if let Some(reason) = self.reason() {
            invoke(&callback, &reason);
        } else {
            self.state.callbacks.write().push(Box::new(callback));
        }
    }

    /// Returns whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst)
    }

    /// Returns the cancellation reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.state.reason.read().clone()
    }
}

fn invoke(callback: &(dyn Fn(&str) + Send + Sync), reason: &str) {
    if let Err(e) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| callback(reason))) {
        warn!("Cancellation callback panicked: {:?}", e);
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_token_default_not_cancelled() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        assert!(token.reason().is_none());
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let token = CancellationToken::new();
        token.cancel("shutdown");
        token.cancel("second");

        assert!(token.is_cancelled());
        assert_eq!(token.reason(), Some("shutdown".to_string()));
    }

    #[test]
    fn test_clones_share_state() {
        let token = CancellationToken::new();
        let handle = token.clone();
        handle.cancel("from another task");
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_callbacks_run_once() {
        let token = CancellationToken::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        token.on_cancel(move |reason| {
            assert_eq!(reason, "stop");
            c.fetch_add(1, Ordering::SeqCst);
        });

        token.cancel("stop");
        token.cancel("stop again");
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_on_cancel_after_cancellation_runs_immediately() {
        let token = CancellationToken::new();
        token.cancel("done");

        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        token.on_cancel(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_callback_is_suppressed() {
        let token = CancellationToken::new();
        token.on_cancel(|_| panic!("Intentional panic"));
        token.cancel("test");
        assert!(token.is_cancelled());
    }
}
