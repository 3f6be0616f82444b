//! # onion-pipeline
//!
//! An ordered middleware pipeline for async Rust. Handlers run one at a time
//! against a shared, mutable context, and each decides whether control moves
//! on to the next one.
//!
//! ## The contract
//!
//! - Handlers run in registration order, strictly one at a time.
//! - A handler passes control on by awaiting [`Next::run`]. Whatever it does
//!   after that await runs while the chain unwinds (the "onion").
//! - A handler that never calls `next` ends the chain there.
//! - A handler that returns `Ok(Some(value))` ends the execution with a value.
//! - Calling the same continuation twice fails the execution with
//!   [`Error::DuplicateContinuation`]. Nothing downstream runs a second time.
//! - Every execution runs over a snapshot of the handlers registered when it
//!   started. Appending afterwards only affects later executions.
//!
//! What this crate leaves to you:
//!
//! - **Cancellation**: drop the execution future, or wrap it in
//!   `tokio::time::timeout`.
//! - **Concrete middleware**: logging, auth, retries. Write them as handlers.
//!
//! ## Quick start
//!
//! ```rust
//! use std::collections::BTreeMap;
//! use onion_pipeline::Pipeline;
//!
//! type Ctx = BTreeMap<&'static str, i32>;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), onion_pipeline::Error> {
//! let mut pipe = Pipeline::<Ctx>::new()
//!     .with_fn(|ctx, next| Box::pin(async move {
//!         ctx.insert("x", 1);
//!         next.run(ctx).await
//!     }));
//!
//! // Does not call `next`: the chain stops here.
//! pipe.use_fn(|ctx, _next| Box::pin(async move {
//!     ctx.insert("y", 2);
//!     Ok(None)
//! }));
//!
//! pipe.use_fn(|ctx, next| Box::pin(async move {
//!     ctx.insert("z", 3);
//!     next.run(ctx).await
//! }));
//!
//! let ctx = pipe.execute(Ctx::new()).await?.into_context().unwrap_or_default();
//! assert_eq!(ctx, Ctx::from([("x", 1), ("y", 2)]));
//! # Ok(())
//! # }
//! ```

mod chain;
mod error;
mod macros;
mod middleware;
mod next;
mod pipeline;

pub use error::{BoxError, Error};
pub use middleware::{
    BoxFuture, BoxedErrorHandler, BoxedMiddleware, ErrorHandler, Flow, FnErrorHandler,
    FnMiddleware, Middleware, boxed, from_fn, recover_fn,
};
pub use next::Next;
pub use pipeline::{Outcome, Pipeline};
