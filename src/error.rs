use std::fmt;
use std::sync::Arc;

/// A computation failure re-packaged as a cheaply-`Clone`-able, `'static`
/// error, so that `Future::result`/`Future::exception` can be called any
/// number of times and hand back an equivalent error every time.
///
/// The original error's `Display` text is preserved; its concrete type and
/// source chain are not, the same way Python's traceback text survives a
/// `Future.exception()` call but the original live traceback object does not
/// need to.
#[derive(Debug, Clone)]
pub struct SharedError(Arc<str>);

impl SharedError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        SharedError(message.into().into())
    }

    pub(crate) fn from_error(err: impl std::error::Error) -> Self {
        SharedError::new(err.to_string())
    }

    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "callable panicked with a non-string payload".to_string()
        };
        SharedError::new(message)
    }
}

impl fmt::Display for SharedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for SharedError {}

/// Everything that can go wrong when driving or observing a [`crate::Future`].
#[derive(thiserror::Error, Debug, Clone)]
pub enum Error {
    /// The Future was cancelled before it ever ran.
    #[error("future was cancelled")]
    Cancelled,

    /// A blocking operation did not complete before its deadline.
    #[error("timed out with {remaining} of {total} futures still unfinished")]
    Timeout {
        /// How many of the futures this call was waiting on were still unfinished.
        remaining: usize,
        /// How many futures this call was waiting on in total.
        total: usize,
    },

    /// The Executor driving this Future has shut down or otherwise stopped
    /// functioning, so the Future will never be driven to completion.
    #[error("executor is broken and can no longer run futures")]
    BrokenExecutor,

    /// The user's callable raised (or panicked with) an error.
    #[error("computation failed: {0}")]
    Computation(#[source] SharedError),

    /// A caller of the Executor↔Future protocol violated the state machine,
    /// e.g. called `set_result` on a Future that was not RUNNING.
    #[error("programming error: {0}")]
    Programming(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
