use std::panic::AssertUnwindSafe;
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::{Error, Result, SharedError};
use crate::future::Future;

/// Schedules work and hands back a handle to observe its outcome.
///
/// An `Executor` owns the Future↔worker protocol described in the crate
/// docs: it creates the Future, calls `start_or_observe_cancel` before
/// running the work, and reports exactly one of `set_result`/`set_exception`
/// when the work is done. Submitting to an Executor that has shut down
/// fails synchronously with [`Error::BrokenExecutor`] rather than handing
/// back an already-broken Future.
pub trait Executor<T: Send + Sync + 'static> {
    /// Schedules `f` and returns a Future for its eventual result.
    fn submit(&self, f: impl FnOnce() -> T + Send + 'static) -> Result<Future<T>>;

    /// Idempotently stops accepting new work. If `wait`, blocks until every
    /// previously submitted job has finished.
    fn shutdown(&self, wait: bool);

    /// Submits one job per item, eagerly (before the returned iterator is
    /// polled), and returns a lazy iterator yielding each item's result in
    /// submission order. Dropping the iterator before consuming it cancels
    /// every not-yet-consumed Future. Fails synchronously, without
    /// submitting anything further, at the first item whose submission
    /// fails.
    fn map<I>(
        &self,
        f: impl Fn(I) -> T + Send + Sync + 'static,
        iter: impl IntoIterator<Item = I>,
        timeout: Option<Duration>,
    ) -> Result<MapIter<T>>
    where
        I: Send + 'static,
        Self: Sized,
    {
        let f = Arc::new(f);
        let futures: Vec<Future<T>> = iter
            .into_iter()
            .map(|item| {
                let f = f.clone();
                self.submit(move || f(item))
            })
            .collect::<Result<_>>()?;
        Ok(MapIter {
            deadline: timeout.map(|t| Instant::now() + t),
            futures,
        })
    }
}

/// Lazy iterator returned by [`Executor::map`]. Pops Futures in submission
/// order and blocks for each one's remaining share of the overall deadline.
/// Any Futures left unconsumed when this iterator is dropped are cancelled,
/// mirroring the `finally: future.cancel()` cleanup of the original.
#[derive(Debug)]
pub struct MapIter<T: Send + Sync + 'static> {
    deadline: Option<Instant>,
    futures: Vec<Future<T>>,
}

impl<T: Clone + Send + Sync + 'static> Iterator for MapIter<T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.futures.is_empty() {
            return None;
        }
        let future = self.futures.remove(0);
        let remaining = match self.deadline {
            None => None,
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    let remaining = self.futures.len() + 1;
                    future.cancel();
                    return Some(Err(Error::Timeout {
                        remaining,
                        total: remaining,
                    }));
                }
                Some(deadline - now)
            }
        };
        Some(future.result(remaining))
    }
}

impl<T: Send + Sync + 'static> Drop for MapIter<T> {
    fn drop(&mut self) {
        for future in self.futures.drain(..) {
            future.cancel();
        }
    }
}

type Job = Box<dyn FnOnce() + Send>;

struct Worker {
    handle: Option<JoinHandle<()>>,
}

/// The one concrete [`Executor`] this crate ships: a fixed pool of OS
/// threads pulling boxed closures off a shared `mpsc` queue.
///
/// Each worker drives the full handshake — `start_or_observe_cancel`,
/// run the closure, `set_result`/`set_exception` — with
/// `std::panic::catch_unwind` translating a panicking closure into a
/// `set_exception` rather than taking the worker thread down with it.
pub struct ThreadPoolExecutor {
    sender: Mutex<Option<Sender<Job>>>,
    workers: Mutex<Vec<Worker>>,
}

impl ThreadPoolExecutor {
    /// Spawns `worker_count` threads, each named `{prefix}-{n}` for
    /// diagnostics (`prefix` defaults to `"cofuture-worker"`).
    ///
    /// # Panics
    ///
    /// Panics if `worker_count` is zero.
    pub fn new(worker_count: usize, thread_name_prefix: Option<&str>) -> Self {
        assert!(worker_count > 0, "ThreadPoolExecutor needs at least one worker");
        let prefix = thread_name_prefix.unwrap_or("cofuture-worker").to_string();
        let (sender, receiver) = mpsc::channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));

        let workers = (0..worker_count)
            .map(|n| {
                let receiver = receiver.clone();
                let handle = thread::Builder::new()
                    .name(format!("{prefix}-{n}"))
                    .spawn(move || worker_loop(receiver))
                    .expect("failed to spawn executor worker thread");
                Worker {
                    handle: Some(handle),
                }
            })
            .collect();

        ThreadPoolExecutor {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
        }
    }
}

fn worker_loop(receiver: Arc<Mutex<mpsc::Receiver<Job>>>) {
    loop {
        let job = {
            let receiver = receiver.lock().expect("executor receiver mutex poisoned");
            receiver.recv()
        };
        match job {
            Ok(job) => job(),
            Err(_) => break,
        }
    }
}

impl<T: Send + Sync + 'static> Executor<T> for ThreadPoolExecutor {
    fn submit(&self, f: impl FnOnce() -> T + Send + 'static) -> Result<Future<T>> {
        let sender_guard = self.sender.lock().expect("executor sender mutex poisoned");
        let Some(sender) = sender_guard.as_ref() else {
            return Err(Error::BrokenExecutor);
        };

        let future = Future::new();
        let worker_future = future.clone();
        let job: Job = Box::new(move || {
            if !worker_future.start_or_observe_cancel() {
                return;
            }
            match std::panic::catch_unwind(AssertUnwindSafe(f)) {
                Ok(value) => worker_future.set_result(value),
                Err(payload) => {
                    worker_future.set_exception_shared(SharedError::from_panic(payload))
                }
            }
        });

        sender.send(job).map_err(|_| Error::BrokenExecutor)?;
        Ok(future)
    }

    fn shutdown(&self, wait: bool) {
        if let Some(sender) = self.sender.lock().expect("executor sender mutex poisoned").take() {
            drop(sender);
        }
        if wait {
            let mut workers = self.workers.lock().expect("executor workers mutex poisoned");
            for worker in workers.iter_mut() {
                if let Some(handle) = worker.handle.take() {
                    let _ = handle.join();
                }
            }
        }
    }
}

impl Drop for ThreadPoolExecutor {
    /// Gives `ThreadPoolExecutor` the same guarantee a context manager's
    /// `__exit__` gives the original: going out of scope always waits for
    /// in-flight work.
    fn drop(&mut self) {
        <Self as Executor<()>>::shutdown(self, true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submit_runs_closure_and_reports_result() {
        let pool = ThreadPoolExecutor::new(2, None);
        let future = pool.submit(|| 1 + 1).unwrap();
        assert_eq!(future.result(None).unwrap(), 2);
    }

    #[test]
    fn submit_panic_becomes_computation_error() {
        let pool = ThreadPoolExecutor::new(1, None);
        let future: Future<i32> = pool.submit(|| panic!("boom")).unwrap();
        assert!(matches!(future.result(None), Err(Error::Computation(_))));
    }

    #[test]
    fn submit_after_shutdown_fails_with_broken_executor() {
        let pool = ThreadPoolExecutor::new(1, None);
        <ThreadPoolExecutor as Executor<i32>>::shutdown(&pool, true);
        let err = pool.submit(|| 1).unwrap_err();
        assert!(matches!(err, Error::BrokenExecutor));
    }

    #[test]
    fn map_yields_results_in_submission_order() {
        let pool = ThreadPoolExecutor::new(4, None);
        let results: Vec<i32> = pool
            .map(|x: i32| x * 2, vec![1, 2, 3], None)
            .unwrap()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(results, vec![2, 4, 6]);
    }

    #[test]
    fn map_cancels_the_future_whose_own_result_call_timed_out() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::time::Duration;

        let pool = ThreadPoolExecutor::new(1, None);
        // Keep the single worker busy so the map jobs below stay Pending in
        // the queue until we've already blown the deadline.
        let warmup = pool.submit(|| thread::sleep(Duration::from_millis(50))).unwrap();

        let ran = Arc::new(AtomicUsize::new(0));
        let counter = ran.clone();
        let mut iter = pool
            .map(
                move |_: i32| {
                    counter.fetch_add(1, Ordering::SeqCst);
                },
                vec![1, 2, 3],
                Some(Duration::from_millis(1)),
            )
            .unwrap();
        thread::sleep(Duration::from_millis(10));

        let first = iter.next().unwrap();
        assert!(matches!(first, Err(Error::Timeout { remaining: 3, total: 3 })));
        drop(iter);

        warmup.result(None).unwrap();
        thread::sleep(Duration::from_millis(50));
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn map_cancels_unconsumed_futures_on_drop() {
        let pool = ThreadPoolExecutor::new(1, None);
        let mut iter = pool.map(|x: i32| x, vec![1, 2, 3], None).unwrap();
        let first = iter.next().unwrap().unwrap();
        assert_eq!(first, 1);
        drop(iter);
    }

    #[test]
    fn map_fails_synchronously_on_shutdown_executor() {
        let pool = ThreadPoolExecutor::new(1, None);
        <ThreadPoolExecutor as Executor<i32>>::shutdown(&pool, true);
        let err = pool.map(|x: i32| x, vec![1, 2, 3], None).unwrap_err();
        assert!(matches!(err, Error::BrokenExecutor));
    }

    #[test]
    fn shutdown_is_idempotent() {
        let pool = ThreadPoolExecutor::new(1, None);
        <ThreadPoolExecutor as Executor<i32>>::shutdown(&pool, true);
        <ThreadPoolExecutor as Executor<i32>>::shutdown(&pool, true);
        <ThreadPoolExecutor as Executor<i32>>::shutdown(&pool, false);
    }
}
