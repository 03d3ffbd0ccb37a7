use std::collections::HashSet;

use secrecy::{ExposeSecret, Secret};

/// Settings for one Mattermost webhook pair.
#[derive(Clone, Default)]
pub struct MattermostSettings {
    /// Mattermost incoming-webhook URL the bot posts to.
    pub outgoing_url: String,
    /// Path on the bot's server that Mattermost's outgoing webhook calls.
    pub incoming_path: String,
    /// Accepted outgoing-webhook tokens. Empty accepts every request.
    pub tokens: Vec<Secret<String>>,
    /// Used when a sent message sets no user name.
    pub override_username: String,
    /// Used when a sent message sets no icon.
    pub icon_url: String,
    pub insecure_skip_verify: bool,
}

impl MattermostSettings {
    /// Trimmed, non-empty tokens.
    pub(crate) fn token_set(&self) -> HashSet<String> {
        self.tokens
            .iter()
            .map(|t| t.expose_secret().trim().to_string())
            .filter(|t| !t.is_empty())
            .collect()
    }
}

impl std::fmt::Debug for MattermostSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MattermostSettings")
            .field("outgoing_url", &self.outgoing_url)
            .field("incoming_path", &self.incoming_path)
            .field("tokens", &format_args!("[REDACTED; {}]", self.tokens.len()))
            .field("override_username", &self.override_username)
            .field("icon_url", &self.icon_url)
            .field("insecure_skip_verify", &self.insecure_skip_verify)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_tokens_are_ignored_and_debug_redacts() {
        let settings = MattermostSettings {
            tokens: vec![
                Secret::new(" abc ".to_string()),
                Secret::new("   ".to_string()),
            ],
            ..Default::default()
        };
        let set = settings.token_set();
        assert_eq!(set.len(), 1);
        assert!(set.contains("abc"));
        assert!(!format!("{settings:?}").contains("abc"));
    }
}
