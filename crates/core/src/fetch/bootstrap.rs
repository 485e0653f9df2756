use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

/// One-shot guard for the cookie bootstrap some sites require.
///
/// The wrapped visit runs at most once per process once it succeeds. A failed
/// visit leaves the guard unset so a later request tries again.
#[derive(Debug, Default)]
pub struct Bootstrap {
    done: AtomicBool,
    lock: Mutex<()>,
}

impl Bootstrap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_initialised(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    /// Run `visit` unless a previous call already succeeded.
    ///
    /// Returns whether the session is initialised after the call.
    pub async fn ensure<F, Fut>(&self, visit: F) -> bool
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = bool>,
    {
        if self.is_initialised() {
            return true;
        }

        let _guard = self.lock.lock().await;
        if self.is_initialised() {
            return true;
        }

        let ok = visit().await;
        if ok {
            self.done.store(true, Ordering::Release);
        }
        ok
    }
}
