use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;

use tracing::error;

use crate::error::{Error, Result, SharedError};
use crate::id::FutureId;
use crate::waiter::WaiterSink;

/// The state machine in §4.1: `Pending` is the only start state, and once a
/// Future leaves any of the three terminal states it never returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum State {
    Pending,
    Running,
    Cancelled,
    CancelledAndNotified,
    Finished,
}

impl State {
    fn is_done(self) -> bool {
        matches!(
            self,
            State::Cancelled | State::CancelledAndNotified | State::Finished
        )
    }

    fn is_cancelled(self) -> bool {
        matches!(self, State::Cancelled | State::CancelledAndNotified)
    }
}

type Callback<T> = Box<dyn FnOnce(Future<T>) + Send>;

pub(crate) struct Shared<T> {
    pub(crate) state: State,
    slot: Option<std::result::Result<T, SharedError>>,
    pub(crate) waiters: Vec<Arc<dyn WaiterSink<T>>>,
    callbacks: Vec<Callback<T>>,
}

struct Inner<T> {
    id: FutureId,
    shared: Mutex<Shared<T>>,
    condvar: Condvar,
}

/// A handle to a single asynchronous computation's eventual result or error.
///
/// `Future<T>` is a cheap `Clone` around shared state: every clone observes
/// the same underlying computation, compares equal to every other clone by
/// identity, and can be installed as a waiter target, handed to `wait` or
/// `as_completed`, or polled directly via [`Future::result`].
///
/// # Examples
///
/// ```
/// use cofuture::Future;
///
/// let future = Future::<i32>::new();
/// assert!(future.start_or_observe_cancel());
/// future.set_result(42);
/// assert_eq!(future.result(None).unwrap(), 42);
/// ```
pub struct Future<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Future<T> {
    fn clone(&self) -> Self {
        Future {
            inner: self.inner.clone(),
        }
    }
}

impl<T> PartialEq for Future<T> {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl<T> Eq for Future<T> {}

impl<T> Hash for Future<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl<T> fmt::Debug for Future<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.shared.lock().expect("future mutex poisoned").state;
        f.debug_struct("Future")
            .field("id", &self.inner.id)
            .field("state", &state)
            .finish()
    }
}

impl<T: Send + Sync + 'static> Default for Future<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + Sync + 'static> Future<T> {
    /// Creates a new, `Pending` Future. Most callers get Futures from an
    /// [`crate::Executor`] instead of constructing them directly; this is
    /// the entry point third-party Executor implementations use.
    pub fn new() -> Self {
        Future {
            inner: Arc::new(Inner {
                id: FutureId::next(),
                shared: Mutex::new(Shared {
                    state: State::Pending,
                    slot: None,
                    waiters: Vec::new(),
                    callbacks: Vec::new(),
                }),
                condvar: Condvar::new(),
            }),
        }
    }

    /// Stable identity used by [`crate::lock_many`] for deadlock-free
    /// ordered lock acquisition across a set of Futures.
    pub fn id(&self) -> FutureId {
        self.inner.id
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Shared<T>> {
        self.inner.shared.lock().expect("future mutex poisoned")
    }

    pub(crate) fn state_locked(guard: &Shared<T>) -> State {
        guard.state
    }

    pub(crate) fn is_done_locked(guard: &Shared<T>) -> bool {
        guard.state.is_done()
    }

    /// Narrower than [`Future::is_done_locked`]: true only for the states an
    /// Executor will never touch again (`CancelledAndNotified`, `Finished`).
    /// A plain `Cancelled` future still owes its Executor a call to
    /// `start_or_observe_cancel`, so bulk operations that install a Waiter
    /// sized to "what's still pending" must treat it as not yet settled —
    /// see `wait`/`as_completed`.
    pub(crate) fn is_settled_locked(guard: &Shared<T>) -> bool {
        matches!(guard.state, State::CancelledAndNotified | State::Finished)
    }

    pub(crate) fn is_finished_with_exception_locked(guard: &Shared<T>) -> bool {
        guard.state == State::Finished && matches!(guard.slot, Some(Err(_)))
    }

    pub(crate) fn install_waiter(&self, guard: &mut Shared<T>, waiter: Arc<dyn WaiterSink<T>>) {
        guard.waiters.push(waiter);
    }

    pub(crate) fn remove_waiter(&self, waiter: &Arc<dyn WaiterSink<T>>) {
        let mut guard = self.lock();
        if let Some(pos) = guard
            .waiters
            .iter()
            .position(|w| Arc::ptr_eq(w, waiter))
        {
            guard.waiters.remove(pos);
        }
    }

    /// Cancels the Future if it hasn't started running yet.
    ///
    /// Returns `false` if the Future is `Running` or `Finished` (cancellation
    /// cannot interrupt work already underway); returns `true` idempotently
    /// if the Future is already in a terminal cancelled state.
    pub fn cancel(&self) -> bool {
        let mut guard = self.lock();
        match guard.state {
            State::Running | State::Finished => false,
            State::Cancelled | State::CancelledAndNotified => true,
            State::Pending => {
                guard.state = State::Cancelled;
                self.inner.condvar.notify_all();
                drop(guard);
                self.run_callbacks();
                true
            }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.lock().state.is_cancelled()
    }

    pub fn is_running(&self) -> bool {
        self.lock().state == State::Running
    }

    pub fn is_done(&self) -> bool {
        self.lock().state.is_done()
    }

    /// Executor-only: transitions `Pending` to `Running`, or promotes an
    /// already-`Cancelled` Future to `CancelledAndNotified` while notifying
    /// every installed waiter under this Future's own lock.
    ///
    /// Returns `true` if the caller should proceed to run the work;
    /// `false` if the work was cancelled and must be abandoned.
    ///
    /// # Panics
    ///
    /// Panics if the Future is not `Pending` or `Cancelled` — calling this
    /// more than once, or after the Future has finished, is a programming
    /// error in the Executor driving it.
    pub fn start_or_observe_cancel(&self) -> bool {
        let mut guard = self.lock();
        match guard.state {
            State::Cancelled => {
                guard.state = State::CancelledAndNotified;
                // Notify every waiter while still holding our own lock, so a
                // waiter that was installed before this transition can never
                // miss it (see the notify-then-unlock rationale on `finish`).
                for waiter in guard.waiters.iter() {
                    waiter.add_cancelled(self.clone());
                }
                false
            }
            State::Pending => {
                guard.state = State::Running;
                true
            }
            other => {
                drop(guard);
                self.report_programming_error(format!(
                    "start_or_observe_cancel called while future was {other:?}"
                ))
            }
        }
    }

    /// Executor-only: stores the computed value and transitions to
    /// `Finished`. Panics if the Future is not `Running`.
    pub fn set_result(&self, value: T) {
        self.finish(Ok(value));
    }

    /// Executor-only: stores a computation error and transitions to
    /// `Finished`. Panics if the Future is not `Running`.
    pub fn set_exception(&self, err: impl std::error::Error) {
        self.finish(Err(SharedError::from_error(err)));
    }

    pub(crate) fn set_exception_shared(&self, err: SharedError) {
        self.finish(Err(err));
    }

    fn finish(&self, outcome: std::result::Result<T, SharedError>) {
        let mut guard = self.lock();
        if guard.state != State::Running {
            let state = guard.state;
            drop(guard);
            self.report_programming_error(format!(
                "set_result/set_exception called while future was {state:?}"
            ));
            return;
        }
        let is_err = outcome.is_err();
        guard.slot = Some(outcome);
        guard.state = State::Finished;
        // Notify-then-unlock: every waiter's `add_*` acquires only its own
        // mutex, never this Future's, so calling it here cannot deadlock,
        // and a waiter installed before this point can never miss the
        // transition.
        for waiter in guard.waiters.iter() {
            if is_err {
                waiter.add_exception(self.clone());
            } else {
                waiter.add_result(self.clone());
            }
        }
        self.inner.condvar.notify_all();
        drop(guard);

        self.run_callbacks();
    }

    /// Registers `callback` to run exactly once, after the Future becomes
    /// terminal, with a clone of this Future's handle. If the Future is
    /// already terminal, `callback` runs synchronously before this call
    /// returns. Panics inside `callback` are caught and logged; they never
    /// propagate to the caller and never affect other callbacks.
    pub fn add_done_callback(&self, callback: impl FnOnce(Future<T>) + Send + 'static) {
        let mut guard = self.lock();
        if !guard.state.is_done() {
            guard.callbacks.push(Box::new(callback));
            return;
        }
        drop(guard);
        self.invoke_callback(Box::new(callback));
    }

    fn run_callbacks(&self) {
        let callbacks = std::mem::take(&mut self.lock().callbacks);
        for callback in callbacks {
            self.invoke_callback(callback);
        }
    }

    fn invoke_callback(&self, callback: Callback<T>) {
        let future = self.clone();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            callback(future);
        }));
        if let Err(payload) = result {
            error!(
                target: "cofuture",
                future_id = %self.inner.id,
                message = %SharedError::from_panic(payload),
                "done callback panicked"
            );
        }
    }

    fn report_programming_error(&self, message: String) -> ! {
        error!(target: "cofuture", future_id = %self.inner.id, %message, "programming error");
        panic!("{}", Error::Programming(message));
    }

    fn wait_until_done(&self, timeout: Option<Duration>) -> std::result::Result<MutexGuard<'_, Shared<T>>, Error> {
        let guard = self.lock();
        if guard.state.is_done() {
            return Ok(guard);
        }
        match timeout {
            None => Ok(self
                .inner
                .condvar
                .wait_while(guard, |s| !s.state.is_done())
                .expect("future mutex poisoned")),
            Some(timeout) => {
                let (guard, _) = self
                    .inner
                    .condvar
                    .wait_timeout_while(guard, timeout, |s| !s.state.is_done())
                    .expect("future mutex poisoned");
                if guard.state.is_done() {
                    Ok(guard)
                } else {
                    Err(Error::Timeout {
                        remaining: 1,
                        total: 1,
                    })
                }
            }
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Future<T> {
    /// Blocks for up to `timeout` (forever if `None`) until the Future is
    /// terminal, then returns its value or re-raises its stored error.
    /// Fails with [`Error::Cancelled`] if the Future was cancelled, or
    /// [`Error::Timeout`] if `timeout` elapsed first.
    pub fn result(&self, timeout: Option<Duration>) -> Result<T> {
        let guard = self.wait_until_done(timeout)?;
        if guard.state.is_cancelled() {
            return Err(Error::Cancelled);
        }
        match guard.slot.clone().expect("finished future missing result") {
            Ok(value) => Ok(value),
            Err(err) => Err(Error::Computation(err)),
        }
    }

    /// Blocks for up to `timeout` (forever if `None`) until the Future is
    /// terminal, then returns its stored error (`None` if it finished
    /// successfully). Fails with [`Error::Cancelled`]/[`Error::Timeout`]
    /// under the same conditions as [`Future::result`].
    pub fn exception(&self, timeout: Option<Duration>) -> Result<Option<Error>> {
        let guard = self.wait_until_done(timeout)?;
        if guard.state.is_cancelled() {
            return Err(Error::Cancelled);
        }
        match guard.slot.clone().expect("finished future missing result") {
            Ok(_) => Ok(None),
            Err(err) => Ok(Some(Error::Computation(err))),
        }
    }
}
