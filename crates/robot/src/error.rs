use crate::robot::State;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid handler pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("robot cannot start from state {state}")]
    InvalidState { state: State },

    #[error(transparent)]
    Connector(#[from] courier_channels::Error),

    #[error(transparent)]
    Gateway(#[from] courier_gateway::Error),

    #[error(transparent)]
    Scheduler(#[from] courier_cron::Error),
}
