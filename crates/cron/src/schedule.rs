//! Six-field cron expressions and next-run computation.

use std::{fmt, str::FromStr};

use {
    chrono::{DateTime, TimeZone},
    cron::Schedule,
};

use crate::{Error, Result};

const FIELD_COUNT: usize = 6;

/// A parsed `sec min hour day-of-month month day-of-week` expression.
///
/// Day-of-week accepts names (`MON-FRI`) or the numbers `1-7` with Sunday
/// as 1.
#[derive(Debug, Clone)]
pub struct CronSchedule {
    expr: String,
    schedule: Schedule,
}

impl CronSchedule {
    pub fn parse(expr: &str) -> Result<Self> {
        let expr = expr.trim();
        let fields = expr.split_whitespace().count();
        if fields != FIELD_COUNT {
            return Err(Error::invalid_schedule(
                expr,
                format!("expected {FIELD_COUNT} fields, found {fields}"),
            ));
        }

        let schedule = Schedule::from_str(expr).map_err(|e| Error::invalid_schedule(expr, e))?;
        Ok(Self {
            expr: expr.to_string(),
            schedule,
        })
    }

    #[must_use]
    pub fn expr(&self) -> &str {
        &self.expr
    }

    /// First tick strictly after `after`, or `None` if the schedule has no
    /// future ticks.
    #[must_use]
    pub fn next_after<Z: TimeZone>(&self, after: &DateTime<Z>) -> Option<DateTime<Z>> {
        self.schedule.after(after).next()
    }
}

impl FromStr for CronSchedule {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expr)
    }
}
