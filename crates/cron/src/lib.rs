//! Time-triggered jobs driven by six-field cron expressions
//! (seconds, minutes, hours, day-of-month, month, day-of-week).
//!
//! Each firing runs as its own task; firings of the same job may overlap.

pub mod error;
pub mod schedule;
pub mod service;

pub use {
    error::{Error, Result},
    schedule::CronSchedule,
    service::{CronJob, CronService, JobFn},
};
