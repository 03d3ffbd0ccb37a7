//! Chat-service abstraction.
//!
//! Defines the inbound/outbound message model shared by every crate and the
//! [`Connector`] contract each chat service (Mattermost webhooks, the
//! interactive shell, test doubles) implements.

pub mod connector;
pub mod error;
pub mod message;

pub use {
    connector::{Connector, ConnectorStreams, IncomingWebhook},
    error::{Error, RateLimit, Result},
    message::{InMessage, MessageKind, MessageKinds, OutMessage, Sender},
};
