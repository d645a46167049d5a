//! Send/receive start-up handshake.
//!
//! Senders must not transmit before the receiver is capturing, otherwise
//! early responses are lost. The receive thread flips `ready` under the
//! mutex and wakes any waiters. The same mutex serialises capture teardown
//! against the sender's own shutdown.

use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Duration;

#[derive(Debug, Default)]
pub struct Handshake {
    ready: Mutex<bool>,
    cond: Condvar,
}

impl Handshake {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish readiness and wake every waiting sender.
    pub fn mark_ready(&self) {
        let mut ready = self.ready.lock().unwrap_or_else(PoisonError::into_inner);
        *ready = true;
        self.cond.notify_all();
    }

    pub fn is_ready(&self) -> bool {
        *self.ready.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until ready. `None` waits forever. Returns whether readiness
    /// was observed.
    pub fn wait_ready(&self, timeout: Option<Duration>) -> bool {
        let guard = self.ready.lock().unwrap_or_else(PoisonError::into_inner);
        match timeout {
            None => {
                let guard = self
                    .cond
                    .wait_while(guard, |ready| !*ready)
                    .unwrap_or_else(PoisonError::into_inner);
                *guard
            }
            Some(t) => {
                let (guard, _) = self
                    .cond
                    .wait_timeout_while(guard, t, |ready| !*ready)
                    .unwrap_or_else(PoisonError::into_inner);
                *guard
            }
        }
    }

    /// Run `f` while holding the handshake mutex.
    pub fn with_lock<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.ready.lock().unwrap_or_else(PoisonError::into_inner);
        f()
    }
}
