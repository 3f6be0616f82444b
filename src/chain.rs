//! One execution of a pipeline.
//!
//! A [`Chain`] is built when `execute` is called and lives exactly as long
//! as the execution future. It owns:
//!
//! - a snapshot of the handler sequence (cloned `Arc`s), so appending to the
//!   pipeline while the execution is in flight changes nothing here;
//! - the cursor guard, the last position entered by this execution;
//! - the trip marker, the first position a repeated continuation tried to
//!   enter.
//!
//! Positions only ever move forward. Entering a position that is not past the
//! last one entered means some continuation was called twice. Once tripped,
//! the execution fails with that error even if a handler discarded it.

use std::future;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::trace;

use crate::error::Error;
use crate::middleware::{BoxFuture, BoxedErrorHandler, BoxedMiddleware, Flow};
use crate::next::Next;

/// Marker value before the first position is entered.
const IDLE: usize = usize::MAX;

pub(crate) struct Chain<C, T> {
    stack: Vec<BoxedMiddleware<C, T>>,
    catch: Option<BoxedErrorHandler<C, T>>,
    entered: AtomicUsize,
    tripped: AtomicUsize,
}

impl<C, T> Chain<C, T> {
    pub(crate) fn new(
        stack: Vec<BoxedMiddleware<C, T>>,
        catch: Option<BoxedErrorHandler<C, T>>,
    ) -> Self {
        Self { stack, catch, entered: AtomicUsize::new(IDLE), tripped: AtomicUsize::new(IDLE) }
    }

    pub(crate) fn len(&self) -> usize {
        self.stack.len()
    }

    /// Records `position` as entered, or reports a repeated continuation.
    fn enter(&self, position: usize) -> Result<(), Error> {
        self.entered
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| {
                (last == IDLE || position > last).then_some(position)
            })
            .map(|_| ())
            .map_err(|_| {
                // First trip wins.
                let _ = self.tripped.compare_exchange(IDLE, position, Ordering::AcqRel, Ordering::Acquire);
                Error::DuplicateContinuation { position }
            })
    }

    /// The guard error this execution tripped, if any.
    fn tripped(&self) -> Option<Error> {
        match self.tripped.load(Ordering::Acquire) {
            IDLE => None,
            position => Some(Error::DuplicateContinuation { position }),
        }
    }
}

impl<C, T> Chain<C, T>
where
    C: Send + 'static,
    T: Send + 'static,
{
    /// Enters `position` and drives the handler found there.
    ///
    /// The guard check happens before any future is built, so a repeated
    /// continuation fails at the call site rather than when first polled.
    pub(crate) fn dispatch<'a>(&'a self, position: usize, ctx: &'a mut C) -> BoxFuture<'a, Flow<T>> {
        if let Err(e) = self.enter(position) {
            return Box::pin(future::ready(Err(e)));
        }

        match self.stack.get(position) {
            Some(middleware) => {
                trace!(position, "entering middleware");
                middleware.handle(ctx, Next::new(self, position + 1))
            }
            None => {
                trace!(position, "chain exhausted");
                Box::pin(future::ready(Ok(None)))
            }
        }
    }

    /// Runs the whole chain from position 0, then hands any escaped handler
    /// error to the error handler, if one was registered.
    ///
    /// A tripped guard overrides whatever the handlers resolved with and is
    /// never routed to the error handler.
    pub(crate) async fn run(&self, ctx: &mut C) -> Flow<T> {
        let flow = self.dispatch(0, ctx).await;

        if let Some(error) = self.tripped() {
            return Err(error);
        }

        match (flow, &self.catch) {
            (Err(error), Some(catch)) if !error.is_duplicate_continuation() => {
                trace!("routing error to error handler");
                catch.recover(ctx, error).await
            }
            (flow, _) => flow,
        }
    }
}
