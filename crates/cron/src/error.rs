use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid cron expression '{expr}': {message}")]
    InvalidSchedule { expr: String, message: String },

    #[error("job scheduler is already running")]
    AlreadyRunning,
}

impl Error {
    #[must_use]
    pub fn invalid_schedule(expr: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::InvalidSchedule {
            expr: expr.into(),
            message: message.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
