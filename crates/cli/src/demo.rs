//! Handlers, routes and jobs the stock binary ships with.

use std::sync::{Arc, atomic::Ordering};

use {
    axum::{
        http::Method,
        response::{IntoResponse, Response},
    },
    courier_channels::MessageKinds,
    courier_gateway::Route,
    courier_robot::{Job, Matched, PatternHandler, Robot, ping_route, stats_route},
    tracing::info,
};

/// `hello` (or `@bot hello`) answers `Hello, <user>`.
pub fn handlers() -> courier_robot::Result<Vec<PatternHandler>> {
    let hello = PatternHandler::new(MessageKinds::ANY, r"(?i)hello\b", |m: Matched| async move {
        m.reply(format!("Hello, {}", m.message.user_name)).await?;
        Ok(())
    })?;
    let echo = PatternHandler::new(
        MessageKinds::DIRECT | MessageKinds::MENTION,
        r"(?i)echo\s+(.+)",
        |m: Matched| async move {
            m.reply(m.capture(1).to_string()).await?;
            Ok(())
        },
    )?;
    Ok(vec![hello, echo])
}

/// `/ping`, `/stats` and `GET /hello/{name}`.
pub fn routes() -> Vec<Route<Arc<Robot>>> {
    vec![
        ping_route("/ping"),
        stats_route("/stats"),
        Route::new("/hello/{name}")
            .method(Method::GET)
            .action(|robot: Arc<Robot>, req| async move {
                let vars = robot.route_vars(&req);
                let name = vars.get("name").unwrap_or("stranger");
                Ok::<Response, anyhow::Error>(format!("hello, {name}!").into_response())
            }),
    ]
}

/// Hourly activity summary in the log.
pub fn jobs() -> courier_robot::Result<Vec<Job>> {
    let heartbeat = Job::new("heartbeat", "0 0 * * * *", |robot: Arc<Robot>| async move {
        let stats = robot.stats();
        info!(
            state = %robot.state(),
            uptime_secs = robot.uptime().as_secs(),
            received = stats.received.load(Ordering::Relaxed),
            handled = stats.handled.load(Ordering::Relaxed),
            "heartbeat"
        );
        Ok(())
    })?;
    Ok(vec![heartbeat])
}
