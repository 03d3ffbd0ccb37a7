use {async_trait::async_trait, axum::routing::MethodRouter, tokio::sync::mpsc};

use crate::{Error, InMessage, OutMessage, Result};

/// Receiving ends handed to the core when a connector starts.
///
/// Both queues close when the connector terminates.
pub struct ConnectorStreams {
    pub messages: mpsc::Receiver<InMessage>,
    pub errors: mpsc::Receiver<Error>,
}

/// HTTP endpoint through which a chat service pushes messages to the bot.
pub struct IncomingWebhook {
    /// Mount path; `/` when unset or empty.
    pub path: Option<String>,
    pub handler: MethodRouter,
}

impl IncomingWebhook {
    #[must_use]
    pub fn mount_path(&self) -> &str {
        match self.path.as_deref() {
            Some(path) if !path.is_empty() => path,
            _ => "/",
        }
    }
}

/// Client for one chat service. Each service implements this.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connector identifier (e.g. "mattermost", "shell").
    fn id(&self) -> &str;

    /// Begin receiving messages.
    async fn start(&self) -> Result<ConnectorStreams>;

    /// Request termination. Safe to call once per `start`, and harmless
    /// when the connector already stopped on its own.
    async fn stop(&self);

    /// Deliver one outbound message.
    async fn send(&self, msg: &OutMessage) -> Result<()>;

    /// Webhook to mount on the bot's HTTP server, if the service pushes
    /// messages over HTTP.
    fn incoming_webhook(&self) -> Option<IncomingWebhook> {
        None
    }
}
