use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use onion_pipeline::{Error, Outcome, Pipeline};
use tokio::time::{Instant, sleep};

type Ctx = BTreeMap<&'static str, i32>;

/// Context that records the order handlers touched it in.
type Trail = Vec<String>;

fn marker(pipe: &mut Pipeline<Trail>, name: &'static str) {
    pipe.use_fn(move |ctx, next| {
        Box::pin(async move {
            ctx.push(name.to_owned());
            next.run(ctx).await
        })
    });
}

#[tokio::test]
async fn handlers_run_in_registration_order() {
    let mut pipe = Pipeline::<Trail>::new();
    for name in ["a", "b", "c", "d", "e"] {
        marker(&mut pipe, name);
    }

    let outcome = pipe.execute(Trail::new()).await.unwrap();
    assert_eq!(outcome, Outcome::Context(vec!["a".into(), "b".into(), "c".into(), "d".into(), "e".into()]));
}

#[tokio::test]
async fn handler_that_skips_next_stops_the_chain() {
    let mut pipe = Pipeline::<Ctx>::new()
        .with_fn(|ctx, next| Box::pin(async move {
            ctx.insert("x", 1);
            next.run(ctx).await
        }));
    pipe.use_fn(|ctx, _next| Box::pin(async move {
        ctx.insert("y", 2);
        Ok(None)
    }));
    pipe.use_fn(|ctx, next| Box::pin(async move {
        ctx.insert("z", 3);
        next.run(ctx).await
    }));

    let ctx = pipe.execute(Ctx::new()).await.unwrap().into_context().unwrap();
    assert_eq!(ctx, Ctx::from([("x", 1), ("y", 2)]));
    assert!(!ctx.contains_key("z"));
}

#[tokio::test]
async fn empty_pipeline_hands_context_back_untouched() {
    let pipe = Pipeline::<Ctx>::new();
    let start = Ctx::from([("keep", 7)]);

    let outcome = pipe.execute(start.clone()).await.unwrap();
    assert_eq!(outcome, Outcome::Context(start));

    let mut borrowed = Ctx::new();
    assert!(pipe.execute_mut(&mut borrowed).await.unwrap().is_none());
    assert!(borrowed.is_empty());
}

#[tokio::test]
async fn calling_next_twice_fails_the_execution() {
    let mut pipe = Pipeline::<Ctx>::new();
    pipe.use_fn(|ctx, next| Box::pin(async move {
        let first = next.run(ctx).await;
        assert!(first.is_ok());
        next.run(ctx).await
    }));
    pipe.use_fn(|ctx, next| Box::pin(async move {
        *ctx.entry("tail").or_insert(0) += 1;
        next.run(ctx).await
    }));

    let mut ctx = Ctx::new();
    let err = pipe.execute_mut(&mut ctx).await.unwrap_err();

    assert!(matches!(err, Error::DuplicateContinuation { position: 1 }));
    assert_eq!(ctx["tail"], 1);
}

#[tokio::test]
async fn duplicate_call_after_exhaustion_is_caught() {
    let mut pipe = Pipeline::<Ctx>::new();
    pipe.use_fn(|ctx, next| Box::pin(async move {
        if let Err(e) = next.run(ctx).await {
            return Err(e);
        }
        next.run(ctx).await
    }));

    let err = pipe.execute(Ctx::new()).await.unwrap_err();
    assert!(err.is_duplicate_continuation());
}

#[tokio::test]
async fn delayed_handlers_keep_their_order() {
    let mut pipe = Pipeline::<Ctx>::new();
    pipe.use_fn(|ctx, next| Box::pin(async move {
        sleep(Duration::from_millis(50)).await;
        ctx.insert("a", 1);
        next.run(ctx).await
    }));
    pipe.use_fn(|ctx, next| Box::pin(async move {
        // A's write must already be visible here.
        let seen = ctx.get("a").copied().unwrap_or(0);
        ctx.insert("b", 2);
        ctx.insert("b_saw_a", seen);
        next.run(ctx).await
    }));

    let started = Instant::now();
    let ctx = pipe.execute(Ctx::new()).await.unwrap().into_context().unwrap();

    assert!(started.elapsed() >= Duration::from_millis(50));
    assert_eq!(ctx, Ctx::from([("a", 1), ("b", 2), ("b_saw_a", 1)]));
}

#[tokio::test]
async fn awaiting_next_observes_the_unwind() {
    let mut pipe = Pipeline::<Trail>::new();
    for name in ["outer", "inner"] {
        pipe.use_fn(move |ctx, next| Box::pin(async move {
            ctx.push(format!("{name}:before"));
            let flow = next.run(ctx).await;
            ctx.push(format!("{name}:after"));
            flow
        }));
    }

    let trail = pipe.execute(Trail::new()).await.unwrap().into_context().unwrap();
    assert_eq!(trail, ["outer:before", "inner:before", "inner:after", "outer:after"]);
}

#[tokio::test]
async fn appended_handlers_apply_to_later_executions_only() {
    let mut pipe = Pipeline::<Trail>::new();
    marker(&mut pipe, "first");

    let before = pipe.execute(Trail::new()).await.unwrap();
    marker(&mut pipe, "second");
    let after = pipe.execute(Trail::new()).await.unwrap();

    assert_eq!(before, Outcome::Context(vec!["first".to_owned()]));
    assert_eq!(after, Outcome::Context(vec!["first".to_owned(), "second".to_owned()]));
}

#[tokio::test]
async fn execution_snapshots_handlers_when_created() {
    let mut pipe = Pipeline::<Trail>::new();
    marker(&mut pipe, "first");

    let pending = pipe.execute(Trail::new());
    marker(&mut pipe, "late");

    assert_eq!(pending.await.unwrap(), Outcome::Context(vec!["first".to_owned()]));
    assert_eq!(pipe.len(), 2);
}

#[tokio::test]
async fn handler_value_ends_the_execution() {
    let mut pipe = Pipeline::<Ctx, &'static str>::new();
    pipe.use_fn(|ctx, next| Box::pin(async move {
        ctx.insert("seen", 1);
        next.run(ctx).await
    }));
    pipe.use_fn(|_ctx, _next| Box::pin(async move { Ok(Some("denied")) }));
    pipe.use_fn(|ctx, next| Box::pin(async move {
        ctx.insert("unreachable", 1);
        next.run(ctx).await
    }));

    assert_eq!(pipe.execute(Ctx::new()).await.unwrap(), Outcome::Value("denied"));

    let mut ctx = Ctx::new();
    assert_eq!(pipe.execute_mut(&mut ctx).await.unwrap(), Some("denied"));
    assert_eq!(ctx, Ctx::from([("seen", 1)]));
}

#[tokio::test]
async fn upstream_handler_can_replace_the_downstream_value() {
    let mut pipe = Pipeline::<Ctx, i32>::new();
    pipe.use_fn(|ctx, next| Box::pin(async move {
        let flow = next.run(ctx).await;
        flow.map(|value| value.map(|v| v * 10))
    }));
    pipe.use_fn(|_ctx, _next| Box::pin(async move { Ok(Some(4)) }));

    assert_eq!(pipe.execute(Ctx::new()).await.unwrap(), Outcome::Value(40));
}

#[tokio::test]
async fn handler_error_propagates_without_error_handler() {
    let mut pipe = Pipeline::<Ctx>::new();
    pipe.use_fn(|_ctx, _next| Box::pin(async move { Err(Error::msg("boom")) }));

    let err = pipe.execute(Ctx::new()).await.unwrap_err();
    assert!(matches!(err, Error::Handler(_)));
    assert_eq!(err.to_string(), "handler failed: boom");
}

#[tokio::test]
async fn error_handler_runs_after_the_chain_unwinds() {
    let mut pipe = Pipeline::<Trail, &'static str>::new();
    pipe.use_fn(|ctx, next| Box::pin(async move {
        let flow = next.run(ctx).await;
        ctx.push(format!("outer saw error: {}", flow.is_err()));
        flow
    }));
    pipe.use_fn(|_ctx, _next| Box::pin(async move { Err(Error::msg("bad input")) }));
    pipe.catch_fn(|ctx, error| Box::pin(async move {
        ctx.push(format!("caught: {error}"));
        Ok(Some("recovered"))
    }));

    let mut trail = Trail::new();
    let value = pipe.execute_mut(&mut trail).await.unwrap();

    assert_eq!(value, Some("recovered"));
    assert_eq!(trail, ["outer saw error: true", "caught: handler failed: bad input"]);
}

#[tokio::test]
async fn error_handler_may_rethrow() {
    let mut pipe = Pipeline::<Ctx>::new();
    pipe.use_fn(|_ctx, _next| Box::pin(async move { Err(Error::msg("first")) }));
    pipe.catch_fn(|ctx, error| Box::pin(async move {
        ctx.insert("caught", 1);
        Err(error)
    }));

    let mut ctx = Ctx::new();
    let err = pipe.execute_mut(&mut ctx).await.unwrap_err();
    assert_eq!(err.to_string(), "handler failed: first");
    assert_eq!(ctx["caught"], 1);
}

#[tokio::test]
async fn duplicate_continuation_bypasses_error_handler() {
    let mut pipe = Pipeline::<Ctx>::new();
    pipe.use_fn(|ctx, next| Box::pin(async move {
        let _ = next.run(ctx).await;
        next.run(ctx).await
    }));
    pipe.catch_fn(|ctx, _error| Box::pin(async move {
        ctx.insert("caught", 1);
        Ok(None)
    }));

    let mut ctx = Ctx::new();
    let err = pipe.execute_mut(&mut ctx).await.unwrap_err();
    assert!(err.is_duplicate_continuation());
    assert!(!ctx.contains_key("caught"));
}

#[tokio::test]
async fn concurrent_executions_are_independent() {
    let mut pipe = Pipeline::<Ctx>::new().named("concurrent");
    pipe.use_fn(|ctx, next| Box::pin(async move {
        let delay = ctx.get("delay").copied().unwrap_or(0);
        sleep(Duration::from_millis(delay as u64)).await;
        ctx.insert("done", 1);
        next.run(ctx).await
    }));
    let pipe = Arc::new(pipe);

    let slow = tokio::spawn(pipe.execute(Ctx::from([("delay", 40)])));
    let fast = tokio::spawn(pipe.execute(Ctx::from([("delay", 0)])));

    let (slow, fast) = (slow.await.unwrap().unwrap(), fast.await.unwrap().unwrap());
    assert_eq!(slow, Outcome::Context(Ctx::from([("delay", 40), ("done", 1)])));
    assert_eq!(fast, Outcome::Context(Ctx::from([("delay", 0), ("done", 1)])));
}

#[tokio::test]
async fn continuation_reports_its_position() {
    let mut pipe = Pipeline::<Vec<(usize, usize)>>::new();
    for _ in 0..3 {
        pipe.use_fn(|ctx, next| Box::pin(async move {
            ctx.push((next.position(), next.remaining()));
            next.run(ctx).await
        }));
    }

    let seen = pipe.execute(Vec::new()).await.unwrap().into_context().unwrap();
    assert_eq!(seen, [(1, 2), (2, 1), (3, 0)]);
}

#[tokio::test]
async fn continuation_knows_when_it_is_last() {
    let mut pipe = Pipeline::<Vec<bool>>::new();
    for _ in 0..2 {
        pipe.use_fn(|ctx, next| Box::pin(async move {
            ctx.push(next.is_last());
            next.run(ctx).await
        }));
    }

    let seen = pipe.execute(Vec::new()).await.unwrap().into_context().unwrap();
    assert_eq!(seen, [false, true]);
}

#[tokio::test]
async fn swallowed_duplicate_continuation_still_fails() {
    let mut pipe = Pipeline::<Vec<i32>>::new();
    pipe.use_fn(|ctx, next| Box::pin(async move {
        let _ = next.run(ctx).await;
        let second = next.run(ctx).await;
        ctx.push(if second.is_err() { 99 } else { 0 });
        Ok(None)
    }));
    pipe.use_fn(|ctx, next| Box::pin(async move {
        ctx.push(1);
        next.run(ctx).await
    }));
    pipe.catch_fn(|ctx, _error| Box::pin(async move {
        ctx.push(-1);
        Ok(None)
    }));

    let mut ctx = Vec::new();
    let err = pipe.execute_mut(&mut ctx).await.unwrap_err();

    assert!(matches!(err, Error::DuplicateContinuation { position: 1 }));
    assert_eq!(ctx, [1, 99]);

    let owned = pipe.execute(Vec::new()).await;
    assert!(owned.unwrap_err().is_duplicate_continuation());
}
