use std::sync::{Condvar, Mutex};
use std::time::Duration;

use crate::event::Event;
use crate::future::Future;

/// Notification entry points a [`crate::Future`] calls, under its own
/// condition, every time it reaches a terminal state. Each variant below
/// differs only in when it flips its event.
///
/// Unlike the `list.append` the CPython original relies on — safe there only
/// because of the GIL — every implementation here owns a private mutex
/// guarding its finished list, acquired without ever holding a Future's own
/// condition (the reverse direction is the one the notification protocol
/// forbids).
pub(crate) trait WaiterSink<T>: Send + Sync {
    fn add_result(&self, future: Future<T>);
    fn add_exception(&self, future: Future<T>);
    fn add_cancelled(&self, future: Future<T>);
}

struct AsCompletedState<T> {
    finished: Vec<Future<T>>,
    set: bool,
}

/// Waiter for [`crate::as_completed`]. Consumers alternate between blocking
/// on the event and draining the finished list; `drain` clears the event in
/// the same lock acquisition that swaps the list out, which is what makes it
/// safe against completions racing with the drain.
pub(crate) struct AsCompletedWaiter<T> {
    state: Mutex<AsCompletedState<T>>,
    condvar: Condvar,
}

impl<T> AsCompletedWaiter<T> {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(AsCompletedState {
                finished: Vec::new(),
                set: false,
            }),
            condvar: Condvar::new(),
        }
    }

    fn push(&self, future: Future<T>) {
        let mut state = self.state.lock().expect("waiter mutex poisoned");
        state.finished.push(future);
        state.set = true;
        self.condvar.notify_all();
    }

    /// Blocks until at least one completion has arrived since the last
    /// `drain`, or `timeout` elapses. Returns `false` on timeout.
    pub(crate) fn wait_timeout(&self, timeout: Option<Duration>) -> bool {
        let state = self.state.lock().expect("waiter mutex poisoned");
        match timeout {
            None => {
                let _state = self
                    .condvar
                    .wait_while(state, |s| !s.set)
                    .expect("waiter mutex poisoned");
                true
            }
            Some(timeout) => {
                let (state, _) = self
                    .condvar
                    .wait_timeout_while(state, timeout, |s| !s.set)
                    .expect("waiter mutex poisoned");
                state.set
            }
        }
    }

    /// Atomically swaps out the finished list and clears the event.
    pub(crate) fn drain(&self) -> Vec<Future<T>> {
        let mut state = self.state.lock().expect("waiter mutex poisoned");
        state.set = false;
        std::mem::take(&mut state.finished)
    }
}

impl<T: Send + Sync> WaiterSink<T> for AsCompletedWaiter<T> {
    fn add_result(&self, future: Future<T>) {
        self.push(future);
    }

    fn add_exception(&self, future: Future<T>) {
        self.push(future);
    }

    fn add_cancelled(&self, future: Future<T>) {
        self.push(future);
    }
}

/// Waiter for a single-shot "has anything finished yet" query. The event,
/// once set, stays set — there is no drain/clear cycle, so a plain mutex
/// around the list plus a sticky [`Event`] is enough.
pub(crate) struct FirstCompletedWaiter<T> {
    finished: Mutex<Vec<Future<T>>>,
    event: Event,
}

impl<T> FirstCompletedWaiter<T> {
    pub(crate) fn new() -> Self {
        Self {
            finished: Mutex::new(Vec::new()),
            event: Event::new(),
        }
    }

    fn push(&self, future: Future<T>) {
        self.finished
            .lock()
            .expect("waiter mutex poisoned")
            .push(future);
        self.event.set();
    }

    pub(crate) fn wait_timeout(&self, timeout: Option<Duration>) -> bool {
        match timeout {
            None => {
                self.event.wait();
                true
            }
            Some(timeout) => self.event.wait_timeout(timeout),
        }
    }

    pub(crate) fn finished_futures(&self) -> Vec<Future<T>> {
        std::mem::take(&mut *self.finished.lock().expect("waiter mutex poisoned"))
    }
}

impl<T: Send + Sync> WaiterSink<T> for FirstCompletedWaiter<T> {
    fn add_result(&self, future: Future<T>) {
        self.push(future);
    }

    fn add_exception(&self, future: Future<T>) {
        self.push(future);
    }

    fn add_cancelled(&self, future: Future<T>) {
        self.push(future);
    }
}

/// Waiter used for `FIRST_EXCEPTION` and `ALL_COMPLETED`. `pending_count`
/// starts at the number of inputs that are not yet terminal (cancelled
/// inputs not yet notified still count as pending, see the crate-level
/// design notes); it reaches zero exactly when every input has reported in.
pub(crate) struct AllCompletedWaiter<T> {
    pending: Mutex<usize>,
    stop_on_exception: bool,
    finished: Mutex<Vec<Future<T>>>,
    event: Event,
}

impl<T> AllCompletedWaiter<T> {
    pub(crate) fn new(pending_count: usize, stop_on_exception: bool) -> Self {
        let waiter = Self {
            pending: Mutex::new(pending_count),
            stop_on_exception,
            finished: Mutex::new(Vec::new()),
            event: Event::new(),
        };
        if pending_count == 0 {
            waiter.event.set();
        }
        waiter
    }

    fn record(&self, future: Future<T>) {
        self.finished
            .lock()
            .expect("waiter mutex poisoned")
            .push(future);
    }

    fn decrement(&self) {
        let mut pending = self.pending.lock().expect("waiter mutex poisoned");
        *pending -= 1;
        if *pending == 0 {
            drop(pending);
            self.event.set();
        }
    }

    pub(crate) fn wait_timeout(&self, timeout: Option<Duration>) -> bool {
        match timeout {
            None => {
                self.event.wait();
                true
            }
            Some(timeout) => self.event.wait_timeout(timeout),
        }
    }

    pub(crate) fn finished_futures(&self) -> Vec<Future<T>> {
        std::mem::take(&mut *self.finished.lock().expect("waiter mutex poisoned"))
    }
}

impl<T: Send + Sync> WaiterSink<T> for AllCompletedWaiter<T> {
    fn add_result(&self, future: Future<T>) {
        self.record(future);
        self.decrement();
    }

    fn add_cancelled(&self, future: Future<T>) {
        self.record(future);
        self.decrement();
    }

    fn add_exception(&self, future: Future<T>) {
        self.record(future);
        if self.stop_on_exception {
            self.event.set();
        } else {
            self.decrement();
        }
    }
}
