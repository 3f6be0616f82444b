/// Builds a [`Pipeline`](crate::Pipeline) from zero or more handlers.
///
/// Each argument must implement [`Middleware`](crate::Middleware); closures
/// go through [`from_fn`](crate::from_fn) first.
///
/// ```rust
/// use onion_pipeline::{BoxFuture, Flow, Middleware, Next, Pipeline, pipeline};
///
/// struct Count;
///
/// impl Middleware<u32> for Count {
///     fn handle<'a>(&'a self, ctx: &'a mut u32, next: Next<'a, u32>) -> BoxFuture<'a, Flow<()>> {
///         Box::pin(async move {
///             *ctx += 1;
///             next.run(ctx).await
///         })
///     }
/// }
///
/// let empty: Pipeline<u32> = pipeline![];
/// let three: Pipeline<u32> = pipeline![Count, Count, Count];
/// assert!(empty.is_empty());
/// assert_eq!(three.len(), 3);
/// ```
#[macro_export]
macro_rules! pipeline {
    () => {
        $crate::Pipeline::new()
    };
    ($($middleware:expr),+ $(,)?) => {
        $crate::Pipeline::new()$(.with($middleware))+
    };
}
