use std::error::Error as StdError;

/// Crate-wide result type for connector operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Rate-limit headers reported by the chat service alongside a failed send.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateLimit {
    pub limit: Option<u64>,
    pub remaining: Option<u64>,
    /// Epoch seconds at which the window resets.
    pub reset: Option<u64>,
}

/// Typed connector errors shared by every chat service implementation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Input payload or parameter is invalid.
    #[error("invalid message input: {message}")]
    InvalidInput { message: String },

    /// Operation is currently unavailable (connector not started or stopped).
    #[error("connector unavailable: {message}")]
    Unavailable { message: String },

    /// The chat service answered a send with a non-success status.
    #[error("failed to send a message ({status})")]
    Send {
        status: u16,
        rate_limit: RateLimit,
        request_id: Option<String>,
        body: String,
    },

    /// Network-level failure talking to the chat service.
    #[error("connector transport failed: {context}: {source}")]
    Transport {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    /// Wrapped source error from any other dependency.
    #[error("connector operation failed: {context}: {source}")]
    External {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    /// JSON (de)serialization failed.
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
}

impl Error {
    #[must_use]
    pub fn invalid_input(message: impl std::fmt::Display) -> Self {
        Self::InvalidInput {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn unavailable(message: impl std::fmt::Display) -> Self {
        Self::Unavailable {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn transport(
        context: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::Transport {
            context: context.into(),
            source: Box::new(source),
        }
    }

    #[must_use]
    pub fn external(
        context: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::External {
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// Whether repeating the same send later could plausibly succeed.
    ///
    /// Rate limiting (429), server-side failures (5xx) and transport errors
    /// are transient; everything else is permanent. Nothing in the runtime
    /// retries on its own, callers decide.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Send { status, .. } => *status == 429 || (500..600).contains(status),
            Self::Transport { .. } => true,
            _ => false,
        }
    }

    /// Rate-limit information attached to a failed send, if any.
    #[must_use]
    pub fn rate_limit(&self) -> Option<&RateLimit> {
        match self {
            Self::Send { rate_limit, .. } => Some(rate_limit),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn send_error(status: u16) -> Error {
        Error::Send {
            status,
            rate_limit: RateLimit::default(),
            request_id: None,
            body: String::new(),
        }
    }

    #[test]
    fn rate_limited_and_server_errors_are_retryable() {
        assert!(send_error(429).is_retryable());
        assert!(send_error(503).is_retryable());
        assert!(!send_error(400).is_retryable());
        assert!(!send_error(404).is_retryable());
    }

    #[test]
    fn transport_errors_are_retryable() {
        let err = Error::transport("posting webhook", std::io::Error::other("reset"));
        assert!(err.is_retryable());
        assert!(!Error::unavailable("stopped").is_retryable());
    }

    #[test]
    fn send_error_exposes_rate_limit() {
        let err = Error::Send {
            status: 429,
            rate_limit: RateLimit {
                limit: Some(10),
                remaining: Some(0),
                reset: Some(1_700_000_000),
            },
            request_id: Some("req-1".into()),
            body: "slow down".into(),
        };
        assert_eq!(err.rate_limit().and_then(|r| r.remaining), Some(0));
        assert_eq!(err.to_string(), "failed to send a message (429)");
    }
}
