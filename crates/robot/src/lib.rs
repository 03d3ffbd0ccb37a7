//! Chat-bot runtime core.
//!
//! A [`Robot`] owns one connector, a fixed set of handlers, routes and jobs,
//! and drives them through one lifecycle:
//! 1. `start` mounts routes, spawns the worker pool and HTTP listener
//! 2. the connector starts, then the job scheduler
//! 3. inbound messages are offered to every handler via the worker queue
//! 4. `stop` (or a connector failure) tears everything down in order

pub mod error;
pub mod handler;
pub mod job;
pub mod robot;
pub mod routes;
mod worker;

#[cfg(test)]
mod testing;

pub use {
    error::{Error, Result},
    handler::{Handler, HandlerAction, Matched, PatternHandler},
    job::{Job, JobAction},
    robot::{DEFAULT_QUEUE_DEPTH, DEFAULT_WORKERS, Robot, RobotBuilder, RobotConfig, State},
    routes::{ping_route, stats_route},
    worker::Stats,
};
