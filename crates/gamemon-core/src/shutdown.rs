use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Duration;

/// Cancellation shared by the loops of one process.
///
/// Waits on this signal return as soon as shutdown is triggered, so loops
/// sleeping between polls stop immediately. A loop that dies on an error
/// records the reason with [`ShutdownSignal::fail`].
pub struct ShutdownSignal {
    shutdown: AtomicBool,
    condvar: Condvar,
    failure: Mutex<Option<String>>,
}

impl ShutdownSignal {
    /// Create a new shutdown signal in the non-shutdown state.
    pub fn new() -> Self {
        Self {
            shutdown: AtomicBool::new(false),
            condvar: Condvar::new(),
            failure: Mutex::new(None),
        }
    }

    /// Request a clean shutdown, waking all waiting threads.
    pub fn trigger(&self) {
        let _guard = self.failure.lock().unwrap_or_else(PoisonError::into_inner);
        self.shutdown.store(true, Ordering::SeqCst);
        self.condvar.notify_all();
    }

    /// Shut down because of an error. The first recorded reason is kept.
    pub fn fail<S: Into<String>>(&self, reason: S) {
        let mut failure = self.failure.lock().unwrap_or_else(PoisonError::into_inner);
        if failure.is_none() {
            *failure = Some(reason.into());
        }
        self.shutdown.store(true, Ordering::SeqCst);
        self.condvar.notify_all();
    }

    /// Check if shutdown has been triggered.
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Reason passed to [`ShutdownSignal::fail`], if any
    pub fn failure(&self) -> Option<String> {
        self.failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Wait for the specified duration or until shutdown is triggered.
    ///
    /// Returns `true` if shutdown was triggered, `false` if the wait completed normally.
    pub fn wait(&self, duration: Duration) -> bool {
        let guard = self.failure.lock().unwrap_or_else(PoisonError::into_inner);
        if self.is_shutdown() {
            return true;
        }

        let (_guard, timeout) = self
            .condvar
            .wait_timeout_while(guard, duration, |_| !self.is_shutdown())
            .unwrap_or_else(PoisonError::into_inner);

        !timeout.timed_out()
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}
