use std::sync::atomic::{AtomicU64, Ordering};

/// Stable identity assigned to a [`crate::Future`] at construction.
///
/// The only purpose of this id is to give [`crate::lock_many`] a total order to
/// acquire Future conditions in, so that two threads locking overlapping sets
/// of Futures can never deadlock against each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FutureId(u64);

static NEXT_ID: AtomicU64 = AtomicU64::new(0);

impl FutureId {
    /// Allocates the next id in a process-wide monotonically increasing sequence.
    pub(crate) fn next() -> Self {
        FutureId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for FutureId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
