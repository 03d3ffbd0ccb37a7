//! Message handlers and the built-in pattern handler.

use std::{fmt, future::Future, sync::Arc};

use {
    async_trait::async_trait,
    courier_channels::{InMessage, MessageKind, MessageKinds},
    futures::future::BoxFuture,
    regex::Regex,
};

use crate::{Error, Result};

/// Something that may act on inbound messages.
///
/// Every handler is offered every message. `can_handle` must not have side
/// effects; it runs on a worker right before `handle`.
#[async_trait]
pub trait Handler: Send + Sync {
    fn can_handle(&self, msg: &InMessage) -> bool;

    async fn handle(&self, msg: Arc<InMessage>) -> anyhow::Result<()>;
}

/// A message together with the groups captured by the handler's pattern.
#[derive(Debug, Clone)]
pub struct Matched {
    pub message: Arc<InMessage>,
    /// Whole match first, then each group; unmatched groups are empty.
    pub captures: Vec<String>,
}

impl Matched {
    /// Capture `i`, or `""` when out of range.
    #[must_use]
    pub fn capture(&self, i: usize) -> &str {
        self.captures.get(i).map_or("", String::as_str)
    }

    pub async fn reply(&self, text: impl Into<String>) -> courier_channels::Result<()> {
        self.message.reply(text).await
    }
}

pub type HandlerAction =
    Arc<dyn Fn(Matched) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Matches message kind and a prefix-anchored pattern.
///
/// For mentions, the `@name` must be the bot's own name and the pattern is
/// applied to the text after it.
pub struct PatternHandler {
    kinds: MessageKinds,
    pattern: Regex,
    action: HandlerAction,
}

impl PatternHandler {
    pub fn new<F, Fut>(kinds: MessageKinds, pattern: &str, action: F) -> Result<Self>
    where
        F: Fn(Matched) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let anchored = format!(r"\A(?:{pattern})");
        let pattern_re = Regex::new(&anchored).map_err(|source| Error::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(Self {
            kinds,
            pattern: pattern_re,
            action: Arc::new(move |m| {
                Box::pin(action(m)) as BoxFuture<'static, anyhow::Result<()>>
            }),
        })
    }

    /// Captures for `msg`, or `None` when this handler does not apply.
    #[must_use]
    pub fn captures(&self, msg: &InMessage) -> Option<Vec<String>> {
        let kind = msg.kind();
        if !self.kinds.accepts(kind) {
            return None;
        }

        let text = if kind == MessageKind::Mention {
            let own_name = msg.sender.as_ref().map(|s| s.sender_name());
            if msg.mention_name() != own_name {
                return None;
            }
            msg.mentionless_text()
        } else {
            msg.text.as_str()
        };

        let caps = self.pattern.captures(text)?;
        Some(
            caps.iter()
                .map(|m| m.map_or_else(String::new, |m| m.as_str().to_string()))
                .collect(),
        )
    }
}

#[async_trait]
impl Handler for PatternHandler {
    fn can_handle(&self, msg: &InMessage) -> bool {
        self.captures(msg).is_some()
    }

    async fn handle(&self, msg: Arc<InMessage>) -> anyhow::Result<()> {
        let Some(captures) = self.captures(&msg) else {
            anyhow::bail!("cannot handle message: {msg:?}");
        };
        (self.action)(Matched {
            message: msg,
            captures,
        })
        .await
    }
}

impl fmt::Debug for PatternHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatternHandler")
            .field("kinds", &self.kinds)
            .field("pattern", &self.pattern.as_str())
            .finish_non_exhaustive()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::testing::Recorder,
        rstest::rstest,
        std::sync::Mutex,
    };

    fn noop(kinds: MessageKinds, pattern: &str) -> PatternHandler {
        PatternHandler::new(kinds, pattern, |_m| async { Ok(()) }).unwrap()
    }

    fn msg(channel: &str, text: &str) -> InMessage {
        InMessage::new(channel, "alice", text).with_sender(Recorder::named("bot"))
    }

    #[rstest]
    #[case(MessageKinds::ANY, "town-square", "hello world", true)]
    #[case(MessageKinds::ANY, "@alice", "hello world", true)]
    #[case(MessageKinds::ANY, "town-square", "@bot hello world", true)]
    #[case(MessageKinds::PUBLIC, "@alice", "hello world", false)]
    #[case(MessageKinds::DIRECT, "@alice", "hello world", true)]
    #[case(MessageKinds::MENTION, "town-square", "hello world", false)]
    #[case(MessageKinds::MENTION, "town-square", "@bot hello", true)]
    #[case(MessageKinds::MENTION, "town-square", "@otherbot hello", false)]
    #[case(MessageKinds::ANY, "town-square", "@otherbot hello", false)]
    #[case(MessageKinds::PUBLIC | MessageKinds::MENTION, "town-square", "@bot hello", true)]
    #[case(MessageKinds::ANY, "town-square", "say hello", false)]
    fn kind_and_prefix_matching(
        #[case] kinds: MessageKinds,
        #[case] channel: &str,
        #[case] text: &str,
        #[case] expected: bool,
    ) {
        let handler = noop(kinds, "hello");
        assert_eq!(handler.can_handle(&msg(channel, text)), expected);
    }

    #[test]
    fn whole_match_is_the_only_capture_without_groups() {
        let handler = noop(MessageKinds::ANY, r"\Ahello");
        for channel in ["town-square", "@alice"] {
            let captures = handler.captures(&msg(channel, "hello world")).unwrap();
            assert_eq!(captures, vec!["hello".to_string()]);
        }
    }

    #[test]
    fn groups_follow_whole_match() {
        let handler = noop(MessageKinds::MENTION, r"deploy (\w+)(?: to (\w+))?");
        let captures = handler
            .captures(&msg("town-square", "@bot   deploy api"))
            .unwrap();
        assert_eq!(captures, vec!["deploy api", "api", ""]);
    }

    #[test]
    fn mention_without_sender_is_rejected() {
        let handler = noop(MessageKinds::ANY, "hello");
        let msg = InMessage::new("town-square", "alice", "@bot hello");
        assert!(!handler.can_handle(&msg));
    }

    #[test]
    fn bad_pattern_is_rejected() {
        let err = PatternHandler::new(MessageKinds::ANY, "(unclosed", |_m| async { Ok(()) })
            .unwrap_err();
        assert!(matches!(err, Error::InvalidPattern { .. }));
    }

    #[tokio::test]
    async fn handle_passes_captures_to_action() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handler = PatternHandler::new(MessageKinds::ANY, r"echo (.*)", move |m: Matched| {
            let sink = Arc::clone(&sink);
            async move {
                sink.lock().unwrap().push(m.capture(1).to_string());
                Ok(())
            }
        })
        .unwrap();

        let msg = Arc::new(msg("town-square", "echo ping"));
        handler.handle(msg).await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["ping".to_string()]);
    }

    #[tokio::test]
    async fn handle_without_match_is_an_error() {
        let handler = noop(MessageKinds::ANY, "hello");
        let msg = Arc::new(msg("town-square", "bye"));
        assert!(handler.handle(msg).await.is_err());
    }

    #[tokio::test]
    async fn reply_through_match() {
        let rec = Recorder::named("bot");
        let handler = PatternHandler::new(MessageKinds::ANY, "hello", |m: Matched| async move {
            m.reply(format!("Hello, {}", m.message.user_name)).await?;
            Ok(())
        })
        .unwrap();

        let msg = Arc::new(
            InMessage::new("town-square", "alice", "hello").with_sender(rec.clone()),
        );
        handler.handle(msg).await.unwrap();

        let sent = rec.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].text, "@alice Hello, alice");
        assert_eq!(sent[0].target_channel_name(), "town-square");
    }
}
