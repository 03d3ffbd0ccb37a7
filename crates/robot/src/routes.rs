//! Built-in application routes.

use std::sync::{Arc, atomic::Ordering};

use {
    axum::{
        Json,
        http::Method,
        response::{IntoResponse, Response},
    },
    courier_gateway::Route,
    serde_json::json,
};

use crate::robot::Robot;

/// `GET path` answers `pong`.
pub fn ping_route(path: impl Into<String>) -> Route<Arc<Robot>> {
    Route::new(path)
        .method(Method::GET)
        .action(|_robot: Arc<Robot>, _req| async {
            Ok::<Response, anyhow::Error>("pong".into_response())
        })
}

/// `GET path` answers runtime counters as JSON.
pub fn stats_route(path: impl Into<String>) -> Route<Arc<Robot>> {
    Route::new(path)
        .method(Method::GET)
        .action(|robot: Arc<Robot>, _req| async move {
            let stats = robot.stats();
            let body = json!({
                "uptime_secs": robot.uptime().as_secs(),
                "state": robot.state().as_str(),
                "handlers": robot.handler_count(),
                "routes": robot.route_count(),
                "jobs": robot.job_count(),
                "received": stats.received.load(Ordering::Relaxed),
                "dispatched": stats.dispatched.load(Ordering::Relaxed),
                "handled": stats.handled.load(Ordering::Relaxed),
                "handler_errors": stats.handler_errors.load(Ordering::Relaxed),
                "handler_panics": stats.handler_panics.load(Ordering::Relaxed),
            });
            Ok(Json(body).into_response())
        })
}
