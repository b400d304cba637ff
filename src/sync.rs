//! Small synchronisation helpers shared by the session and speech workers.
//!
//! [`Event`] is a resettable boolean flag that threads can block on with a
//! timeout.  The session uses one as its "dismiss" signal: a button press or
//! a cancel sets it, and the episode worker waits on it while holding the
//! final response on screen.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Lock `mutex`, recovering the guard if a previous holder panicked.
///
/// Every value guarded this way is plain data that stays consistent between
/// statements, so continuing after a poisoned lock is always safe.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// A manual-reset event: `set` wakes every waiter and stays set until `clear`.
#[derive(Debug, Default)]
pub struct Event {
    flag: Mutex<bool>,
    cond: Condvar,
}

impl Event {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag and wake all waiters.
    pub fn set(&self) {
        *lock(&self.flag) = true;
        self.cond.notify_all();
    }

    /// Lower the flag.
    pub fn clear(&self) {
        *lock(&self.flag) = false;
    }

    pub fn is_set(&self) -> bool {
        *lock(&self.flag)
    }

    /// Block until the flag is set or `timeout` elapses.
    ///
    /// Returns `true` when the flag was observed set.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut flag = lock(&self.flag);
        while !*flag {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            flag = self
                .cond
                .wait_timeout(flag, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
