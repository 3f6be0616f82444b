//! Minimal onion-pipeline example: a request-shaped context flowing through
//! timing, auth and handling steps.
//!
//! Run with:
//!   cargo run --example basic
//!
//! Every execution emits a `pipeline` span with trace events per step.

use std::time::Instant;

use onion_pipeline::{Error, Outcome, Pipeline};

#[derive(Debug, Default)]
struct Request {
    path: &'static str,
    token: Option<&'static str>,
    user: Option<&'static str>,
    log: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .init();

    let mut app = Pipeline::<Request, &'static str>::new().named("demo");

    // Wraps everything downstream and runs again on the way out.
    app.use_fn(|req, next| Box::pin(async move {
        let started = Instant::now();
        let flow = next.run(req).await;
        req.log.push(format!("{} took {:?}", req.path, started.elapsed()));
        flow
    }));

    // Ends the chain with a value when the token is missing.
    app.use_fn(|req, next| Box::pin(async move {
        match req.token {
            Some("secret") => {
                req.user = Some("alice");
                next.run(req).await
            }
            Some(_) => Err(Error::msg("token rejected")),
            None => Ok(Some("401 unauthorized")),
        }
    }));

    app.use_fn(|req, _next| Box::pin(async move {
        req.log.push(format!("hello, {}", req.user.unwrap_or("nobody")));
        Ok(None)
    }));

    app.catch_fn(|req, error| Box::pin(async move {
        req.log.push(format!("recovered from: {error}"));
        Ok(Some("403 forbidden"))
    }));

    for token in [Some("secret"), None, Some("forged")] {
        let req = Request { path: "/users/42", token, ..Default::default() };
        match app.execute(req).await? {
            Outcome::Value(status) => println!("{token:?} -> {status}"),
            Outcome::Context(req) => println!("{token:?} -> handled: {:?}", req.log),
        }
    }

    Ok(())
}
