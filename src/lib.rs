//! A thread-based `Future` primitive with `wait`/`as_completed` coordination,
//! in the spirit of Python's `concurrent.futures`.
//!
//! A [`Future<T>`] is a cheap, `Clone`-able handle to a single computation's
//! eventual value or error, driven to completion by some [`Executor`] (this
//! crate ships [`ThreadPoolExecutor`]). Multiple consumers can hold the same
//! handle, block on [`Future::result`] individually, or coordinate across a
//! whole set of Futures with [`wait`] or [`as_completed`].
//!
//! ```rust
//! use cofuture::{Executor, ThreadPoolExecutor};
//!
//! let pool = ThreadPoolExecutor::new(4, None);
//! let future = pool.submit(|| 1 + 1).unwrap();
//! assert_eq!(future.result(None).unwrap(), 2);
//! ```

mod as_completed;
mod error;
mod event;
mod executor;
mod future;
mod id;
mod lock_many;
mod wait;
mod waiter;

pub use self::as_completed::{as_completed, AsCompleted};
pub use self::error::{Error, Result, SharedError};
pub use self::executor::{Executor, MapIter, ThreadPoolExecutor};
pub use self::future::Future;
pub use self::id::FutureId;
pub use self::wait::{wait, ReturnWhen, WaitResult};
