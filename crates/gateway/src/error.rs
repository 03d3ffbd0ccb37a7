use std::io;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("route pattern must not be empty")]
    EmptyPattern,

    #[error("route {pattern:?} has no action")]
    MissingAction { pattern: String },

    #[error("invalid route pattern {pattern:?}: {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("http server failed: {0}")]
    Serve(#[source] io::Error),
}

impl Error {
    #[must_use]
    pub fn invalid_pattern(pattern: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::InvalidPattern {
            pattern: pattern.into(),
            message: message.to_string(),
        }
    }
}
