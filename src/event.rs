use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// A manual-reset binary signal backed by a mutex/condvar pair.
///
/// Grounded on the `Condvar`+`Mutex` future primitive pattern: a waiter locks
/// the flag, waits while it is clear, and a setter flips the flag and
/// broadcasts. Unlike a condition variable alone, the flag makes `set`
/// sticky: a thread that calls `wait` after `set` has already fired still
/// sees it as set instead of blocking forever.
#[derive(Debug, Default)]
pub(crate) struct Event {
    flag: Mutex<bool>,
    condvar: Condvar,
}

impl Event {
    pub(crate) fn new() -> Self {
        Self {
            flag: Mutex::new(false),
            condvar: Condvar::new(),
        }
    }

    /// Sets the event and wakes every waiter. Idempotent.
    pub(crate) fn set(&self) {
        let mut flag = self.flag.lock().expect("event mutex poisoned");
        *flag = true;
        self.condvar.notify_all();
    }

    /// Blocks until the event is set, with no deadline.
    pub(crate) fn wait(&self) {
        let flag = self.flag.lock().expect("event mutex poisoned");
        let _flag = self
            .condvar
            .wait_while(flag, |set| !*set)
            .expect("event mutex poisoned");
    }

    /// Blocks until the event is set or `timeout` elapses. Returns `true` if
    /// the event was observed set before the deadline.
    pub(crate) fn wait_timeout(&self, timeout: Duration) -> bool {
        let flag = self.flag.lock().expect("event mutex poisoned");
        let (flag, _) = self
            .condvar
            .wait_timeout_while(flag, timeout, |set| !*set)
            .expect("event mutex poisoned");
        *flag
    }
}
