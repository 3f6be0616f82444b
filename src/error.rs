//! Unified error type.

/// A boxed, thread-safe error produced by application code inside a handler.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The error type returned by a failed pipeline execution.
///
/// The engine itself only ever raises [`Error::DuplicateContinuation`].
/// Everything else is a handler failure wrapped in [`Error::Handler`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A handler invoked its continuation more than once.
    ///
    /// `position` is the chain position the offending call tried to enter.
    /// This error always reaches the caller of `execute`; a registered
    /// [`ErrorHandler`](crate::ErrorHandler) never sees it.
    #[error("continuation already called (position {position})")]
    DuplicateContinuation { position: usize },

    /// A handler failed.
    #[error("handler failed: {0}")]
    Handler(#[source] BoxError),
}

impl Error {
    /// Wraps an application error raised inside a handler.
    pub fn handler(err: impl Into<BoxError>) -> Self {
        Self::Handler(err.into())
    }

    /// Builds a handler error from a plain message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Handler(message.into().into())
    }

    /// `true` if a continuation was called more than once.
    pub fn is_duplicate_continuation(&self) -> bool {
        matches!(self, Self::DuplicateContinuation { .. })
    }

    /// Returns the underlying handler error, if this is one.
    pub fn as_handler(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            Self::Handler(e) => Some(e.as_ref()),
            Self::DuplicateContinuation { .. } => None,
        }
    }
}
