//! Config schema types.

use std::path::PathBuf;

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

pub const DEFAULT_PORT: u16 = 8080;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CourierConfig {
    pub common: CommonConfig,
    pub mattermost: MattermostConfig,
    pub server: ServerConfig,
}

/// Process-level settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CommonConfig {
    /// Log destination: unset or empty for stderr, `-` for stdout, otherwise
    /// a file appended to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log: Option<String>,
    /// Written with the process id on start, removed on exit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid_file: Option<PathBuf>,
}

/// Mattermost webhook connector settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MattermostConfig {
    /// Incoming-webhook URL on the Mattermost side; the bot posts here.
    pub outgoing_url: String,
    /// Path on the bot's HTTP server that Mattermost's outgoing webhook
    /// calls. Empty means `/`.
    pub incoming_path: String,
    /// Accepted outgoing-webhook tokens. Empty accepts every request.
    #[serde(serialize_with = "serialize_secrets")]
    pub tokens: Vec<Secret<String>>,
    /// The bot account name, without the leading `@`.
    pub username: String,
    pub override_username: String,
    pub icon_url: String,
    pub insecure_skip_verify: bool,
}

impl MattermostConfig {
    /// Whether `token` is one of the configured tokens.
    #[must_use]
    pub fn accepts_token(&self, token: &str) -> bool {
        self.tokens.iter().any(|t| t.expose_secret() == token)
    }
}

/// The bot's HTTP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub enable: bool,
    /// Empty binds every interface.
    pub bind_address: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enable: false,
            bind_address: String::new(),
            port: DEFAULT_PORT,
        }
    }
}

impl ServerConfig {
    /// `bind_address:port`, suitable for binding a listener.
    #[must_use]
    pub fn address(&self) -> String {
        let port = if self.port == 0 {
            DEFAULT_PORT
        } else {
            self.port
        };
        match self.bind_address.as_str() {
            "" => format!("0.0.0.0:{port}"),
            host if host.contains(':') && !host.starts_with('[') => format!("[{host}]:{port}"),
            host => format!("{host}:{port}"),
        }
    }
}

fn serialize_secrets<S: serde::Serializer>(
    secrets: &[Secret<String>],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(secrets.iter().map(|s| s.expose_secret()))
}
