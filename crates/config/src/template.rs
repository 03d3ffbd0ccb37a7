//! Starter configuration written by `courier new-config`.

/// The documented default config, with `name` as the bot username.
#[must_use]
pub fn default_config_template(name: &str) -> String {
    format!(
        r##"# Courier Configuration
# =====================
# Environment variable substitution is supported: ${{ENV_VAR}} or
# ${{ENV_VAR:-fallback}}. Example: tokens = ["${{MATTERMOST_TOKEN}}"]
# Command-line flags override values in this file.

[common]
# log = ""                        # "" = stderr, "-" = stdout, otherwise a file (appended)
# pid_file = "/run/courier.pid"   # Written on start, removed on exit

[mattermost]
outgoing_url = ""                 # Mattermost incoming-webhook URL; the bot posts here
incoming_path = "/"               # Path the Mattermost outgoing webhook calls on this server
tokens = []                       # Accepted outgoing-webhook tokens (empty = accept all)
username = "{name}"               # Bot username, without the leading @
override_username = ""            # Post as this name when a message sets none
icon_url = ""                     # Post with this icon when a message sets none
insecure_skip_verify = false      # Skip TLS certificate checks on outgoing posts

[server]
enable = true                     # Serve the webhook and HTTP routes
bind_address = ""                 # "" = all interfaces
port = 8080
"##
    )
}
