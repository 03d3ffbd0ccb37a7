//! Mattermost connector built on plain webhooks.
//!
//! Mattermost's *outgoing* webhook POSTs channel messages to the bot's HTTP
//! server ([`Connector::incoming_webhook`]); the bot answers through a
//! Mattermost *incoming* webhook URL ([`Connector::send`]).
//!
//! [`Connector::incoming_webhook`]: courier_channels::Connector::incoming_webhook
//! [`Connector::send`]: courier_channels::Connector::send

pub mod client;
pub mod config;
pub mod webhook;

pub use {client::MattermostConnector, config::MattermostSettings};
