use std::collections::HashMap;
use std::sync::MutexGuard;

use crate::future::{Future, Shared};
use crate::id::FutureId;

/// Acquires the condition of every *distinct* Future in `futures` in a
/// single, deterministic order (by [`Future::id`]), then hands back the
/// guards indexed by the caller's original ordering.
///
/// Two threads racing to lock overlapping Future sets always agree on this
/// order, so neither can hold a lock the other is waiting on while waiting
/// for a lock the first holds — the standard AB-BA deadlock is structurally
/// impossible. Release order does not matter for this guarantee, only
/// acquisition order does.
///
/// Futures repeated in `futures` are only locked once: a `Mutex` is not
/// reentrant, so locking the same Future's condition twice on one thread
/// would self-deadlock.
pub(crate) struct OrderedGuards<'a, T> {
    by_id: HashMap<FutureId, MutexGuard<'a, Shared<T>>>,
}

impl<'a, T: Send + Sync + 'static> OrderedGuards<'a, T> {
    pub(crate) fn lock_all(futures: &'a [Future<T>]) -> Self {
        let mut unique: Vec<&Future<T>> = Vec::with_capacity(futures.len());
        for future in futures {
            if !unique.iter().any(|f| f.id() == future.id()) {
                unique.push(future);
            }
        }
        unique.sort_by_key(|f| f.id());

        let by_id = unique.into_iter().map(|f| (f.id(), f.lock())).collect();
        OrderedGuards { by_id }
    }

    pub(crate) fn get_mut(&mut self, future: &Future<T>) -> &mut Shared<T> {
        self.by_id
            .get_mut(&future.id())
            .expect("future was not included in lock_all")
    }
}
