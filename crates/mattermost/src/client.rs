use std::{sync::Arc, time::Duration};

use {
    async_trait::async_trait,
    reqwest::header::HeaderMap,
    serde::Serialize,
    tracing::{debug, info, warn},
};

use courier_channels::{
    Connector, ConnectorStreams, Error, IncomingWebhook, OutMessage, RateLimit, Result,
};

use crate::{
    config::MattermostSettings,
    webhook::{self, Inbox},
};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// JSON body for a Mattermost incoming webhook.
#[derive(Debug, Serialize, PartialEq, Eq)]
struct OutgoingPayload {
    #[serde(skip_serializing_if = "String::is_empty")]
    text: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    channel: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    username: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    icon_url: String,
}

/// Connector talking to Mattermost through a webhook pair.
pub struct MattermostConnector {
    settings: MattermostSettings,
    http: reqwest::Client,
    inbox: Arc<Inbox>,
}

impl MattermostConnector {
    pub fn new(settings: MattermostSettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .danger_accept_invalid_certs(settings.insecure_skip_verify)
            .build()
            .map_err(|e| Error::external("building HTTP client", e))?;
        let inbox = Arc::new(Inbox::new(settings.token_set()));
        Ok(Self {
            settings,
            http,
            inbox,
        })
    }

    #[must_use]
    pub fn settings(&self) -> &MattermostSettings {
        &self.settings
    }

    fn payload(&self, msg: &OutMessage) -> OutgoingPayload {
        let username = if msg.user_name.is_empty() {
            self.settings.override_username.clone()
        } else {
            msg.user_name.clone()
        };
        let icon_url = if msg.icon_url.is_empty() {
            self.settings.icon_url.clone()
        } else {
            msg.icon_url.clone()
        };
        OutgoingPayload {
            text: msg.text.clone(),
            channel: msg.target_channel_name().to_string(),
            username,
            icon_url,
        }
    }
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

fn rate_limit(headers: &HeaderMap) -> RateLimit {
    RateLimit {
        limit: header_u64(headers, "x-ratelimit-limit"),
        remaining: header_u64(headers, "x-ratelimit-remaining"),
        reset: header_u64(headers, "x-ratelimit-reset"),
    }
}

#[async_trait]
impl Connector for MattermostConnector {
    fn id(&self) -> &str {
        "mattermost"
    }

    async fn start(&self) -> Result<ConnectorStreams> {
        info!(path = %self.settings.incoming_path, "mattermost connector started");
        Ok(self.inbox.open())
    }

    async fn stop(&self) {
        if self.inbox.close() {
            info!("mattermost connector stopped");
        }
    }

    async fn send(&self, msg: &OutMessage) -> Result<()> {
        let payload = self.payload(msg);
        debug!(channel = %payload.channel, "posting message to mattermost");

        let resp = self
            .http
            .post(&self.settings.outgoing_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::transport("posting to mattermost", e))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }

        let rate_limit = rate_limit(resp.headers());
        let request_id = resp
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = resp.text().await.unwrap_or_default();
        warn!(
            status = status.as_u16(),
            request_id = request_id.as_deref().unwrap_or(""),
            "mattermost rejected a message"
        );
        Err(Error::Send {
            status: status.as_u16(),
            rate_limit,
            request_id,
            body,
        })
    }

    fn incoming_webhook(&self) -> Option<IncomingWebhook> {
        Some(IncomingWebhook {
            path: Some(self.settings.incoming_path.clone()),
            handler: webhook::router(Arc::clone(&self.inbox)),
        })
    }
}
