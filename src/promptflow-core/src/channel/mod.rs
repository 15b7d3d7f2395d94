//! Transport abstraction.
//!
//! The engine talks to a chat platform only through [`Channel`] and
//! [`PlatformMessage`]. A channel sends rendered visuals and hands out
//! [`Subscription`]s to inbound messages and reactions. The filters used for
//! those subscriptions are defined here because deciding who may answer a
//! prompt is engine logic, not transport logic.

pub mod memory;
pub mod subscription;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ChannelResult;
use crate::visual::OutgoingMessage;

pub use memory::{MemoryChannel, Outbound};
pub use subscription::{Subscription, SubscriptionSender};

/// A conversation endpoint on a chat platform.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Stable identifier, used by the busy-channel registry.
    fn id(&self) -> &str;

    /// Identity of the engine's own automated sender, if the transport
    /// echoes bot messages back through subscriptions.
    fn system_id(&self) -> Option<&str> {
        None
    }

    /// Send a message.
    async fn send(&self, message: OutgoingMessage) -> ChannelResult<Arc<dyn PlatformMessage>>;

    /// Subscribe to inbound messages accepted by `filter`.
    fn subscribe_messages(&self, filter: MessageFilter) -> Subscription<IncomingMessage>;

    /// Subscribe to reactions on `message` accepted by `filter`, for at most
    /// `timeout`.
    fn subscribe_reactions(
        &self,
        message: &dyn PlatformMessage,
        filter: ReactionFilter,
        timeout: Duration,
    ) -> Subscription<Reaction>;
}

/// A message sent by the engine that can later be edited or reacted to.
#[async_trait]
pub trait PlatformMessage: Send + Sync {
    fn id(&self) -> &str;

    fn content(&self) -> &str;

    fn sender_id(&self) -> &str;

    /// Replace the message body.
    async fn edit(&self, message: OutgoingMessage) -> ChannelResult<()>;

    /// Add a reaction.
    async fn react(&self, symbol: &str) -> ChannelResult<()>;
}

/// A message received from the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingMessage {
    /// Platform message id (may be empty until assigned by the transport).
    #[serde(default)]
    pub id: String,
    /// Message body.
    pub content: String,
    /// Sender identity.
    pub author_id: String,
    /// Whether the sender is an automated account.
    #[serde(default)]
    pub is_bot: bool,
}

impl IncomingMessage {
    pub fn new(author_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            content: content.into(),
            author_id: author_id.into(),
            is_bot: false,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn from_bot(mut self) -> Self {
        self.is_bot = true;
        self
    }
}

/// A reaction added to a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    /// Reaction symbol (emoji name).
    pub symbol: String,
    /// Who reacted.
    pub user_id: String,
    /// Whether the reacting user is an automated account.
    #[serde(default)]
    pub is_bot: bool,
}

impl Reaction {
    pub fn new(user_id: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            user_id: user_id.into(),
            is_bot: false,
        }
    }

    pub fn from_bot(mut self) -> Self {
        self.is_bot = true;
        self
    }
}

/// Accepts messages from the permitted responder, or from the engine's own
/// system sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageFilter {
    responder_id: String,
    system_id: Option<String>,
}

impl MessageFilter {
    pub fn new(responder_id: impl Into<String>, system_id: Option<&str>) -> Self {
        Self {
            responder_id: responder_id.into(),
            system_id: system_id.map(str::to_string),
        }
    }

    pub fn responder_id(&self) -> &str {
        &self.responder_id
    }

    pub fn accepts(&self, message: &IncomingMessage) -> bool {
        message.author_id == self.responder_id
            || self.system_id.as_deref() == Some(message.author_id.as_str())
    }
}

/// Accepts human reactions using one of a fixed set of symbols.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactionFilter {
    symbols: Vec<String>,
}

impl ReactionFilter {
    pub fn new<I, S>(symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            symbols: symbols.into_iter().map(Into::into).collect(),
        }
    }

    pub fn accepts(&self, reaction: &Reaction) -> bool {
        !reaction.is_bot && self.symbols.iter().any(|s| *s == reaction.symbol)
    }
}
