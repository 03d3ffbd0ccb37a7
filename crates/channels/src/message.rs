//! Inbound and outbound message types plus kind classification.

use std::{
    fmt,
    ops::BitOr,
    sync::{Arc, LazyLock},
};

use {async_trait::async_trait, regex::Regex};

use crate::{Error, Result};

#[allow(clippy::unwrap_used)]
static MENTION_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\A@([0-9a-zA-Z_]+)").unwrap());

#[allow(clippy::unwrap_used)]
static MENTION_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\A@(?:[0-9a-zA-Z_]+)\s*").unwrap());

/// Something that can deliver outbound messages and name itself.
///
/// The orchestration core attaches one to every inbound message before
/// dispatch so handlers can reply without holding a reference to the core.
#[async_trait]
pub trait Sender: Send + Sync {
    async fn send(&self, msg: OutMessage) -> Result<()>;

    /// Identity of the bot account, used to recognise mentions of itself.
    fn sender_name(&self) -> &str;
}

/// How a message reached the bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Posted in a shared channel without addressing anyone.
    Public,
    /// Starts with an `@name` token.
    Mention,
    /// Posted in a private/direct channel.
    Direct,
}

impl MessageKind {
    /// Classify a message from its channel name and text.
    ///
    /// Direct channels are named with a leading `@`; otherwise a leading `@`
    /// in the text makes it a mention.
    #[must_use]
    pub fn classify(channel_name: &str, text: &str) -> Self {
        if channel_name.starts_with('@') {
            Self::Direct
        } else if text.starts_with('@') {
            Self::Mention
        } else {
            Self::Public
        }
    }

    const fn bit(self) -> u8 {
        match self {
            Self::Public => 1 << 1,
            Self::Mention => 1 << 2,
            Self::Direct => 1 << 3,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Public => write!(f, "public"),
            Self::Mention => write!(f, "mention"),
            Self::Direct => write!(f, "direct"),
        }
    }
}

/// Set of message kinds a handler is interested in.
///
/// The empty set is the "any kind" sentinel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct MessageKinds(u8);

impl MessageKinds {
    pub const ANY: Self = Self(0);
    pub const DIRECT: Self = Self(MessageKind::Direct.bit());
    pub const MENTION: Self = Self(MessageKind::Mention.bit());
    pub const PUBLIC: Self = Self(MessageKind::Public.bit());

    #[must_use]
    pub fn is_any(self) -> bool {
        self.0 == 0
    }

    /// Whether a message of `kind` passes this filter.
    #[must_use]
    pub fn accepts(self, kind: MessageKind) -> bool {
        self.is_any() || self.0 & kind.bit() != 0
    }
}

impl From<MessageKind> for MessageKinds {
    fn from(kind: MessageKind) -> Self {
        Self(kind.bit())
    }
}

impl BitOr for MessageKinds {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// A message received from the chat service.
#[derive(Clone, Default)]
pub struct InMessage {
    /// Attached by the core before dispatch.
    pub sender: Option<Arc<dyn Sender>>,
    pub channel_id: String,
    pub channel_name: String,
    pub user_id: String,
    pub user_name: String,
    pub text: String,
    /// The connector's own representation; never interpreted by the core.
    pub raw: serde_json::Value,
}

impl InMessage {
    pub fn new(
        channel_name: impl Into<String>,
        user_name: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            channel_name: channel_name.into(),
            user_name: user_name.into(),
            text: text.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_channel_id(mut self, channel_id: impl Into<String>) -> Self {
        self.channel_id = channel_id.into();
        self
    }

    #[must_use]
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    #[must_use]
    pub fn with_raw(mut self, raw: serde_json::Value) -> Self {
        self.raw = raw;
        self
    }

    #[must_use]
    pub fn with_sender(mut self, sender: Arc<dyn Sender>) -> Self {
        self.sender = Some(sender);
        self
    }

    /// Kind of this message, recomputed from the current channel and text.
    #[must_use]
    pub fn kind(&self) -> MessageKind {
        MessageKind::classify(&self.channel_name, &self.text)
    }

    /// Name following a leading `@`, or `None` when the text is not a mention.
    #[must_use]
    pub fn mention_name(&self) -> Option<&str> {
        MENTION_NAME
            .captures(&self.text)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
    }

    /// Text with the leading `@name` token and the whitespace after it removed.
    #[must_use]
    pub fn mentionless_text(&self) -> &str {
        match MENTION_PREFIX.find(&self.text) {
            Some(m) => &self.text[m.end()..],
            None => &self.text,
        }
    }

    /// Reply in the same channel, addressing the author.
    ///
    /// `@user ` is prepended unless the text already starts with it.
    pub async fn reply(self: &Arc<Self>, text: impl Into<String>) -> Result<()> {
        let sender = self
            .sender
            .clone()
            .ok_or_else(|| Error::unavailable("message has no sender attached"))?;

        let target = format!("@{}", self.user_name);
        let mut text = text.into();
        if !text.starts_with(&target) {
            text = format!("{target} {text}");
        }

        let msg = OutMessage {
            channel_id: self.channel_id.clone(),
            channel_name: self.channel_name.clone(),
            text,
            in_reply_to: Some(Arc::clone(self)),
            triggered_by: Some(Arc::clone(self)),
            ..OutMessage::default()
        };
        sender.send(msg).await
    }
}

impl fmt::Debug for InMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMessage")
            .field("sender", &self.sender.as_ref().map(|s| s.sender_name()))
            .field("channel_id", &self.channel_id)
            .field("channel_name", &self.channel_name)
            .field("user_id", &self.user_id)
            .field("user_name", &self.user_name)
            .field("text", &self.text)
            .finish_non_exhaustive()
    }
}

/// A message to deliver through the connector.
#[derive(Debug, Clone, Default)]
pub struct OutMessage {
    pub channel_id: String,
    pub channel_name: String,
    /// Display-name override.
    pub user_name: String,
    /// Icon override.
    pub icon_url: String,
    pub text: String,
    pub in_reply_to: Option<Arc<InMessage>>,
    pub triggered_by: Option<Arc<InMessage>>,
}

impl OutMessage {
    /// A plain message for a named channel.
    pub fn to_channel(channel_name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            channel_name: channel_name.into(),
            text: text.into(),
            ..Self::default()
        }
    }

    /// Channel to deliver to: the replied-to message's channel, else the
    /// triggering message's, else the explicit one.
    #[must_use]
    pub fn target_channel_name(&self) -> &str {
        self.in_reply_to
            .as_deref()
            .or(self.triggered_by.as_deref())
            .map_or(self.channel_name.as_str(), |m| m.channel_name.as_str())
    }
}
