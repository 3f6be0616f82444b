//! Middleware traits and type erasure.
//!
//! # How middleware is stored
//!
//! A pipeline holds handlers of *different* concrete types in one ordered
//! `Vec`. Rust collections hold one concrete type, so every handler is
//! hidden behind `dyn Middleware` and shared through an `Arc`:
//!
//! ```text
//! |ctx, next| Box::pin(async move { … })     ← user writes this
//!        ↓ pipeline.use_fn(…)
//! FnMiddleware(closure)                      ← typed wrapper
//!        ↓ stored as BoxedMiddleware = Arc<dyn Middleware<C, T>>
//! middleware.handle(ctx, next)  per step     ← one vtable dispatch
//! ```
//!
//! Taking a snapshot of the sequence for an execution therefore costs one
//! atomic increment per handler and never copies the handlers themselves.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::Error;
use crate::next::Next;

/// A heap-allocated, type-erased future borrowing from `'a`.
///
/// `Send` so an execution can be spawned onto a multi-threaded runtime.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What a handler, a continuation and an error handler resolve with.
///
/// `Ok(Some(value))` ends the execution with a value, `Ok(None)` carries no
/// value, `Err` fails the execution.
pub type Flow<T> = Result<Option<T>, Error>;

/// A handler shared between a pipeline and its in-flight executions.
pub type BoxedMiddleware<C, T = ()> = Arc<dyn Middleware<C, T>>;

/// A shared, type-erased error handler.
pub type BoxedErrorHandler<C, T = ()> = Arc<dyn ErrorHandler<C, T>>;

// ── Middleware ────────────────────────────────────────────────────────────────

/// One step of a pipeline.
///
/// A handler receives the shared context and the continuation for the rest
/// of the chain. It decides whether to call [`Next::run`] at all, and may do
/// work both before and after awaiting it:
///
/// ```rust
/// use onion_pipeline::{BoxFuture, Flow, Middleware, Next};
///
/// struct Stamp(&'static str);
///
/// impl Middleware<Vec<&'static str>> for Stamp {
///     fn handle<'a>(
///         &'a self,
///         ctx: &'a mut Vec<&'static str>,
///         next: Next<'a, Vec<&'static str>>,
///     ) -> BoxFuture<'a, Flow<()>> {
///         Box::pin(async move {
///             ctx.push(self.0);
///             next.run(ctx).await
///         })
///     }
/// }
/// ```
///
/// Closures go through [`from_fn`] or [`Pipeline::use_fn`](crate::Pipeline::use_fn)
/// instead of implementing this trait by hand.
pub trait Middleware<C, T = ()>: Send + Sync + 'static {
    fn handle<'a>(&'a self, ctx: &'a mut C, next: Next<'a, C, T>) -> BoxFuture<'a, Flow<T>>;
}

/// Erases a handler so it can be collected alongside handlers of other types.
///
/// Feeds [`Pipeline`](crate::Pipeline)'s `Extend` and `FromIterator` impls.
pub fn boxed<C, T>(middleware: impl Middleware<C, T>) -> BoxedMiddleware<C, T> {
    Arc::new(middleware)
}

/// Wraps a closure as a [`Middleware`].
///
/// The `for<'a>` bound lets the compiler infer the closure's argument types,
/// so `|ctx, next| Box::pin(async move { … })` needs no annotations once the
/// context type is known.
pub fn from_fn<C, T, F>(f: F) -> FnMiddleware<F>
where
    F: for<'a> Fn(&'a mut C, Next<'a, C, T>) -> BoxFuture<'a, Flow<T>> + Send + Sync + 'static,
{
    FnMiddleware(f)
}

/// Newtype produced by [`from_fn`], bridging closures to [`Middleware`].
#[derive(Clone)]
pub struct FnMiddleware<F>(F);

impl<C, T, F> Middleware<C, T> for FnMiddleware<F>
where
    F: for<'a> Fn(&'a mut C, Next<'a, C, T>) -> BoxFuture<'a, Flow<T>> + Send + Sync + 'static,
{
    fn handle<'a>(&'a self, ctx: &'a mut C, next: Next<'a, C, T>) -> BoxFuture<'a, Flow<T>> {
        (self.0)(ctx, next)
    }
}

// ── ErrorHandler ──────────────────────────────────────────────────────────────

/// Observes an error that escaped the forward pass of an execution.
///
/// Runs at most once per execution, after every handler upstream of the
/// failure has unwound. Returning `Ok` recovers; returning `Err` re-raises.
/// Duplicate-continuation errors are never delivered here.
pub trait ErrorHandler<C, T = ()>: Send + Sync + 'static {
    fn recover<'a>(&'a self, ctx: &'a mut C, error: Error) -> BoxFuture<'a, Flow<T>>;
}

/// Wraps a closure as an [`ErrorHandler`].
pub fn recover_fn<C, T, F>(f: F) -> FnErrorHandler<F>
where
    F: for<'a> Fn(&'a mut C, Error) -> BoxFuture<'a, Flow<T>> + Send + Sync + 'static,
{
    FnErrorHandler(f)
}

/// Newtype produced by [`recover_fn`].
#[derive(Clone)]
pub struct FnErrorHandler<F>(F);

impl<C, T, F> ErrorHandler<C, T> for FnErrorHandler<F>
where
    F: for<'a> Fn(&'a mut C, Error) -> BoxFuture<'a, Flow<T>> + Send + Sync + 'static,
{
    fn recover<'a>(&'a self, ctx: &'a mut C, error: Error) -> BoxFuture<'a, Flow<T>> {
        (self.0)(ctx, error)
    }
}
