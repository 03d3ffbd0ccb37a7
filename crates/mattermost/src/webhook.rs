//! Receiver for Mattermost outgoing-webhook calls.

use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
};

use {
    axum::{
        Form,
        extract::{State, rejection::FormRejection},
        http::StatusCode,
        response::{IntoResponse, Response},
        routing::{MethodRouter, post},
    },
    serde::{Deserialize, Serialize},
    tokio::sync::mpsc,
    tracing::{debug, warn},
};

use courier_channels::{ConnectorStreams, Error, InMessage};

/// Form fields Mattermost posts for each triggering message.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct WebhookForm {
    pub channel_id: String,
    pub channel_name: String,
    pub team_domain: String,
    pub team_id: String,
    pub text: String,
    pub timestamp: String,
    #[serde(skip_serializing)]
    pub token: String,
    pub trigger_word: String,
    pub user_id: String,
    pub user_name: String,
}

impl WebhookForm {
    /// The core's message, with the form (minus token) kept as `raw`.
    #[must_use]
    pub fn into_message(self) -> InMessage {
        let raw = serde_json::to_value(&self).unwrap_or(serde_json::Value::Null);
        InMessage::new(self.channel_name, self.user_name, self.text)
            .with_channel_id(self.channel_id)
            .with_user_id(self.user_id)
            .with_raw(raw)
    }
}

type Queues = (mpsc::Sender<InMessage>, mpsc::Sender<Error>);

/// Queue ends shared between the connector and its webhook handler.
pub(crate) struct Inbox {
    tokens: HashSet<String>,
    // The error sender is only held so the error stream stays open until stop.
    queues: Mutex<Option<Queues>>,
}

impl Inbox {
    pub(crate) fn new(tokens: HashSet<String>) -> Self {
        Self {
            tokens,
            queues: Mutex::new(None),
        }
    }

    /// Create fresh queues, replacing (and so closing) any previous ones.
    pub(crate) fn open(&self) -> ConnectorStreams {
        let (msg_tx, messages) = mpsc::channel(1);
        let (err_tx, errors) = mpsc::channel(1);
        *self.queues.lock().unwrap_or_else(|e| e.into_inner()) = Some((msg_tx, err_tx));
        ConnectorStreams { messages, errors }
    }

    /// Drop the senders. Returns whether the inbox was open.
    pub(crate) fn close(&self) -> bool {
        self.queues
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .is_some()
    }

    fn messages(&self) -> Option<mpsc::Sender<InMessage>> {
        self.queues
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|(messages, _)| messages.clone())
    }
}

pub(crate) fn router(inbox: Arc<Inbox>) -> MethodRouter {
    post(receive).with_state(inbox)
}

async fn receive(
    State(inbox): State<Arc<Inbox>>,
    form: Result<Form<WebhookForm>, FormRejection>,
) -> Response {
    let Form(form) = match form {
        Ok(form) => form,
        Err(e) => {
            warn!(error = %e, "invalid webhook form data");
            return bad_request();
        },
    };

    if !inbox.tokens.is_empty() {
        if form.token.is_empty() {
            warn!(channel = %form.channel_name, "webhook request without a token");
            return bad_request();
        }
        if !inbox.tokens.contains(form.token.trim()) {
            warn!(channel = %form.channel_name, "webhook request with an unknown token");
            return bad_request();
        }
    }

    let Some(messages) = inbox.messages() else {
        debug!("webhook call while the connector is stopped");
        return unavailable();
    };

    debug!(
        channel = %form.channel_name,
        user = %form.user_name,
        "webhook message received"
    );
    if messages.send(form.into_message()).await.is_err() {
        return unavailable();
    }
    StatusCode::OK.into_response()
}

fn bad_request() -> Response {
    (StatusCode::BAD_REQUEST, "400 Bad Request").into_response()
}

fn unavailable() -> Response {
    (StatusCode::SERVICE_UNAVAILABLE, "503 Service Unavailable").into_response()
}
