//! The pipeline: an ordered, append-only handler registry and its executor.

use std::fmt;
use std::sync::Arc;

use tracing::{Instrument, debug_span};

use crate::chain::Chain;
use crate::error::Error;
use crate::middleware::{
    BoxFuture, BoxedErrorHandler, BoxedMiddleware, ErrorHandler, Flow, Middleware, from_fn,
    recover_fn,
};
use crate::next::Next;

// ── Outcome ──────────────────────────────────────────────────────────────────

/// What a successful [`Pipeline::execute`] resolves with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<C, T> {
    /// A handler ended the chain with a value. The context is dropped.
    Value(T),
    /// No handler produced a value; the context is handed back.
    Context(C),
}

impl<C, T> Outcome<C, T> {
    /// Borrows the value a handler ended the chain with.
    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Value(v) => Some(v),
            Self::Context(_) => None,
        }
    }

    /// Takes the value, dropping the context if there was no value.
    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Value(v) => Some(v),
            Self::Context(_) => None,
        }
    }

    /// Takes the context back, if no handler produced a value.
    pub fn into_context(self) -> Option<C> {
        match self {
            Self::Context(c) => Some(c),
            Self::Value(_) => None,
        }
    }
}

// ── Pipeline ─────────────────────────────────────────────────────────────────

/// An ordered sequence of middleware run against a context of type `C`.
///
/// `T` is the type of value a handler may end the chain with; it defaults to
/// `()` for pipelines that only transform their context.
///
/// The sequence only grows. Each call to [`execute`](Pipeline::execute) or
/// [`execute_mut`](Pipeline::execute_mut) snapshots it, so the returned
/// future is unaffected by handlers appended afterwards and any number of
/// executions may run concurrently.
///
/// ```rust
/// use onion_pipeline::{Outcome, Pipeline};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), onion_pipeline::Error> {
/// let mut pipe = Pipeline::<Vec<u32>>::new()
///     .with_fn(|ctx, next| Box::pin(async move {
///         ctx.push(1);
///         next.run(ctx).await
///     }));
///
/// pipe.use_fn(|ctx, _next| Box::pin(async move {
///     ctx.push(2);
///     Ok(None)
/// }));
///
/// let outcome = pipe.execute(Vec::new()).await?;
/// assert_eq!(outcome, Outcome::Context(vec![1, 2]));
/// # Ok(())
/// # }
/// ```
pub struct Pipeline<C, T = ()> {
    name: Arc<str>,
    stack: Vec<BoxedMiddleware<C, T>>,
    catch: Option<BoxedErrorHandler<C, T>>,
}

impl<C, T> Pipeline<C, T>
where
    C: Send + 'static,
    T: Send + 'static,
{
    pub fn new() -> Self {
        Self { name: Arc::from("pipeline"), stack: Vec::new(), catch: None }
    }

    /// Sets the name reported on the execution span. Returns `self` for chaining.
    pub fn named(mut self, name: impl Into<Arc<str>>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    // ── Registry ─────────────────────────────────────────────────────────────

    /// Appends a handler. Returns `self` so construction chains naturally.
    pub fn with(mut self, middleware: impl Middleware<C, T>) -> Self {
        self.use_with(middleware);
        self
    }

    /// Appends a closure handler. Returns `self` for chaining.
    pub fn with_fn<F>(mut self, f: F) -> Self
    where
        F: for<'a> Fn(&'a mut C, Next<'a, C, T>) -> BoxFuture<'a, Flow<T>> + Send + Sync + 'static,
    {
        self.use_fn(f);
        self
    }

    /// Appends a handler after every handler already registered.
    pub fn use_with(&mut self, middleware: impl Middleware<C, T>) -> &mut Self {
        self.stack.push(Arc::new(middleware));
        self
    }

    /// Appends a closure handler after every handler already registered.
    pub fn use_fn<F>(&mut self, f: F) -> &mut Self
    where
        F: for<'a> Fn(&'a mut C, Next<'a, C, T>) -> BoxFuture<'a, Flow<T>> + Send + Sync + 'static,
    {
        self.use_with(from_fn::<C, T, F>(f))
    }

    /// Registers the handler that receives errors escaping the chain,
    /// replacing any previous one.
    pub fn catch(&mut self, handler: impl ErrorHandler<C, T>) -> &mut Self {
        self.catch = Some(Arc::new(handler));
        self
    }

    /// Closure form of [`catch`](Pipeline::catch).
    pub fn catch_fn<F>(&mut self, f: F) -> &mut Self
    where
        F: for<'a> Fn(&'a mut C, Error) -> BoxFuture<'a, Flow<T>> + Send + Sync + 'static,
    {
        self.catch(recover_fn::<C, T, F>(f))
    }

    /// Builder form of [`catch`](Pipeline::catch).
    pub fn with_catch(mut self, handler: impl ErrorHandler<C, T>) -> Self {
        self.catch(handler);
        self
    }

    // ── Executor ─────────────────────────────────────────────────────────────

    /// Runs the chain against an owned context.
    ///
    /// Resolves with [`Outcome::Value`] if a handler ended the chain with a
    /// value, otherwise with [`Outcome::Context`] carrying the context back.
    /// The future owns its snapshot and does not borrow `self`.
    pub fn execute(&self, ctx: C) -> BoxFuture<'static, Result<Outcome<C, T>, Error>> {
        let chain = self.snapshot();
        let span = debug_span!("pipeline", name = %self.name, handlers = chain.len());

        Box::pin(
            async move {
                let mut ctx = ctx;
                let flow = chain.run(&mut ctx).await;
                flow.map(|value| match value {
                    Some(v) => Outcome::Value(v),
                    None => Outcome::Context(ctx),
                })
            }
            .instrument(span),
        )
    }

    /// Runs the chain against a borrowed context.
    ///
    /// Resolves with the value a handler ended the chain with, if any. The
    /// caller keeps the context either way.
    pub fn execute_mut<'c>(&self, ctx: &'c mut C) -> BoxFuture<'c, Flow<T>> {
        let chain = self.snapshot();
        let span = debug_span!("pipeline", name = %self.name, handlers = chain.len());

        Box::pin(async move { chain.run(ctx).await }.instrument(span))
    }

    fn snapshot(&self) -> Chain<C, T> {
        Chain::new(self.stack.clone(), self.catch.clone())
    }
}

impl<C, T> Default for Pipeline<C, T>
where
    C: Send + 'static,
    T: Send + 'static,
{
    fn default() -> Self { Self::new() }
}

impl<C, T> Clone for Pipeline<C, T> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            stack: self.stack.clone(),
            catch: self.catch.clone(),
        }
    }
}

impl<C, T> fmt::Debug for Pipeline<C, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("handlers", &self.stack.len())
            .field("catch", &self.catch.is_some())
            .finish()
    }
}

impl<C, T> Extend<BoxedMiddleware<C, T>> for Pipeline<C, T> {
    fn extend<I: IntoIterator<Item = BoxedMiddleware<C, T>>>(&mut self, iter: I) {
        self.stack.extend(iter);
    }
}

impl<C, T> FromIterator<BoxedMiddleware<C, T>> for Pipeline<C, T>
where
    C: Send + 'static,
    T: Send + 'static,
{
    fn from_iter<I: IntoIterator<Item = BoxedMiddleware<C, T>>>(iter: I) -> Self {
        let mut pipe = Self::new();
        pipe.extend(iter);
        pipe
    }
}
