//! The continuation handed to every handler.

use std::fmt;

use crate::chain::Chain;
use crate::middleware::{BoxFuture, Flow};

/// Hands control to the rest of the chain.
///
/// A `Next` is bound to one position of the execution it belongs to. Calling
/// [`run`](Next::run) a second time does not re-enter the chain: the call
/// resolves with [`Error::DuplicateContinuation`](crate::Error::DuplicateContinuation)
/// straight away and nothing downstream runs again.
///
/// Not calling `run` at all is how a handler short-circuits the chain.
pub struct Next<'a, C, T = ()> {
    chain: &'a Chain<C, T>,
    position: usize,
}

impl<'a, C, T> Next<'a, C, T>
where
    C: Send + 'static,
    T: Send + 'static,
{
    pub(crate) fn new(chain: &'a Chain<C, T>, position: usize) -> Self {
        Self { chain, position }
    }

    /// Runs the remaining handlers against `ctx`.
    ///
    /// Resolves with whatever the downstream handlers produced, so a handler
    /// can inspect or replace it before returning (the "onion" unwind).
    #[must_use = "the rest of the chain only runs when this future is awaited"]
    pub fn run<'b>(&'b self, ctx: &'b mut C) -> BoxFuture<'b, Flow<T>> {
        self.chain.dispatch(self.position, ctx)
    }

    /// The chain position this continuation enters.
    pub fn position(&self) -> usize {
        self.position
    }

    /// `true` when this continuation only reaches the end of the chain.
    pub fn is_last(&self) -> bool {
        self.position >= self.chain.len()
    }

    /// Number of handlers still ahead of this continuation.
    pub fn remaining(&self) -> usize {
        self.chain.len().saturating_sub(self.position)
    }
}

impl<C, T> fmt::Debug for Next<'_, C, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("position", &self.position)
            .field("len", &self.chain.len())
            .finish()
    }
}
