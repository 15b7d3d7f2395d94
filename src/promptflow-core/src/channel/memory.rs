//! In-process channel.
//!
//! `MemoryChannel` keeps everything the engine sends in memory and lets the
//! host inject inbound messages and reactions. It backs the terminal host and
//! the test-suite. Clones share state.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, trace};

use super::{
    Channel, IncomingMessage, MessageFilter, PlatformMessage, Reaction, ReactionFilter,
    Subscription, SubscriptionSender,
};
use crate::error::{ChannelError, ChannelResult};
use crate::visual::OutgoingMessage;

/// How long the `*_when_ready` helpers wait for a matching subscriber.
const READY_TIMEOUT: Duration = Duration::from_secs(2);
const READY_POLL_INTERVAL: Duration = Duration::from_millis(2);

/// Something the engine did on the channel.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// A new message was sent.
    Sent {
        id: String,
        message: OutgoingMessage,
    },
    /// A sent message was edited.
    Edited {
        id: String,
        message: OutgoingMessage,
    },
    /// A reaction was added to a sent message.
    Reacted { id: String, symbol: String },
}

struct MessageSubscriber {
    filter: MessageFilter,
    sender: SubscriptionSender<IncomingMessage>,
}

struct ReactionSubscriber {
    message_id: String,
    filter: ReactionFilter,
    sender: SubscriptionSender<Reaction>,
    deadline: Instant,
}

impl ReactionSubscriber {
    fn is_live(&self) -> bool {
        !self.sender.is_closed() && Instant::now() < self.deadline
    }
}

#[derive(Default)]
struct State {
    next_id: u64,
    sent: Vec<(String, OutgoingMessage)>,
    edits: Vec<(String, OutgoingMessage)>,
    reactions: Vec<(String, String)>,
    message_subscribers: Vec<MessageSubscriber>,
    reaction_subscribers: Vec<ReactionSubscriber>,
    fail_sends: bool,
    fail_edits: bool,
    fail_reactions: bool,
    edit_delay: Option<Duration>,
}

impl State {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }

    fn prune(&mut self) {
        self.message_subscribers.retain(|s| !s.sender.is_closed());
        self.reaction_subscribers.retain(|s| {
            let live = s.is_live();
            if !live {
                s.sender.close();
            }
            live
        });
    }
}

struct Inner {
    id: String,
    system_id: Option<String>,
    state: Mutex<State>,
    outbox_tx: mpsc::UnboundedSender<Outbound>,
    outbox_rx: Mutex<Option<mpsc::UnboundedReceiver<Outbound>>>,
}

impl Inner {
    fn publish(&self, event: Outbound) {
        // Nobody may be listening; that is fine.
        let _ = self.outbox_tx.send(event);
    }
}

/// An in-memory [`Channel`].
#[derive(Clone)]
pub struct MemoryChannel {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for MemoryChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryChannel")
            .field("id", &self.inner.id)
            .field("system_id", &self.inner.system_id)
            .finish()
    }
}

impl MemoryChannel {
    pub fn new(id: impl Into<String>) -> Self {
        Self::build(id.into(), None)
    }

    /// Channel whose own messages are attributed to `system_id`.
    pub fn with_system_id(id: impl Into<String>, system_id: impl Into<String>) -> Self {
        Self::build(id.into(), Some(system_id.into()))
    }

    fn build(id: String, system_id: Option<String>) -> Self {
        let (outbox_tx, outbox_rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(Inner {
                id,
                system_id,
                state: Mutex::new(State::default()),
                outbox_tx,
                outbox_rx: Mutex::new(Some(outbox_rx)),
            }),
        }
    }

    /// Stream of everything the engine does on this channel. Can be taken once.
    pub fn outbox(&self) -> Option<mpsc::UnboundedReceiver<Outbound>> {
        self.inner.outbox_rx.lock().take()
    }

    /// Hand an inbound message to every matching subscriber. Returns how
    /// many subscribers received it.
    pub fn deliver(&self, message: IncomingMessage) -> usize {
        let mut state = self.inner.state.lock();
        state.prune();
        let message = if message.id.is_empty() {
            let id = state.next_id("in");
            message.with_id(id)
        } else {
            message
        };

        let mut delivered = 0;
        for subscriber in &state.message_subscribers {
            if subscriber.filter.accepts(&message) && subscriber.sender.send(message.clone()) {
                delivered += 1;
            }
        }
        trace!(
            "Delivered {:?} from {} to {} subscriber(s)",
            message.content, message.author_id, delivered
        );
        delivered
    }

    /// Like [`deliver`](Self::deliver), but first waits (briefly) until some
    /// subscriber would accept the message.
    pub async fn deliver_when_ready(&self, message: IncomingMessage) -> usize {
        let deadline = Instant::now() + READY_TIMEOUT;
        loop {
            let ready = {
                let mut state = self.inner.state.lock();
                state.prune();
                state
                    .message_subscribers
                    .iter()
                    .any(|s| s.filter.accepts(&message))
            };
            if ready || Instant::now() >= deadline {
                return self.deliver(message);
            }
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }
    }

    /// Hand a reaction on `message_id` to every matching subscriber.
    pub fn react(&self, message_id: &str, reaction: Reaction) -> usize {
        let mut state = self.inner.state.lock();
        state.prune();
        let mut delivered = 0;
        for subscriber in &state.reaction_subscribers {
            if subscriber.message_id == message_id
                && subscriber.filter.accepts(&reaction)
                && subscriber.sender.send(reaction.clone())
            {
                delivered += 1;
            }
        }
        delivered
    }

    /// Like [`react`](Self::react), but first waits (briefly) until a
    /// reaction subscriber exists for `message_id`.
    pub async fn react_when_ready(&self, message_id: &str, reaction: Reaction) -> usize {
        let deadline = Instant::now() + READY_TIMEOUT;
        loop {
            let ready = {
                let mut state = self.inner.state.lock();
                state.prune();
                state
                    .reaction_subscribers
                    .iter()
                    .any(|s| s.message_id == message_id)
            };
            if ready || Instant::now() >= deadline {
                return self.react(message_id, reaction);
            }
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }
    }

    /// Every message sent so far, in order.
    pub fn sent(&self) -> Vec<OutgoingMessage> {
        self.inner
            .state
            .lock()
            .sent
            .iter()
            .map(|(_, m)| m.clone())
            .collect()
    }

    /// Text bodies of sent text messages, in order.
    pub fn sent_texts(&self) -> Vec<String> {
        self.inner
            .state
            .lock()
            .sent
            .iter()
            .filter_map(|(_, m)| m.as_text().map(str::to_string))
            .collect()
    }

    /// Id of the most recently sent message.
    pub fn last_sent_id(&self) -> Option<String> {
        self.inner.state.lock().sent.last().map(|(id, _)| id.clone())
    }

    /// Edits applied to `message_id`, in order.
    pub fn edits(&self, message_id: &str) -> Vec<OutgoingMessage> {
        self.inner
            .state
            .lock()
            .edits
            .iter()
            .filter(|(id, _)| id == message_id)
            .map(|(_, m)| m.clone())
            .collect()
    }

    /// Reactions the engine added to `message_id`, in order.
    pub fn reactions_on(&self, message_id: &str) -> Vec<String> {
        self.inner
            .state
            .lock()
            .reactions
            .iter()
            .filter(|(id, _)| id == message_id)
            .map(|(_, s)| s.clone())
            .collect()
    }

    pub fn active_message_subscriptions(&self) -> usize {
        let mut state = self.inner.state.lock();
        state.prune();
        state.message_subscribers.len()
    }

    pub fn active_reaction_subscriptions(&self) -> usize {
        let mut state = self.inner.state.lock();
        state.prune();
        state.reaction_subscribers.len()
    }

    /// Make every subsequent send fail.
    pub fn set_fail_sends(&self, fail: bool) {
        self.inner.state.lock().fail_sends = fail;
    }

    /// Make every subsequent edit fail.
    pub fn set_fail_edits(&self, fail: bool) {
        self.inner.state.lock().fail_edits = fail;
    }

    /// Hold every subsequent edit for `delay` before applying it.
    pub fn set_edit_delay(&self, delay: Option<Duration>) {
        self.inner.state.lock().edit_delay = delay;
    }

    /// Make every subsequent reaction by the engine fail.
    pub fn set_fail_reactions(&self, fail: bool) {
        self.inner.state.lock().fail_reactions = fail;
    }
}

#[async_trait]
impl Channel for MemoryChannel {
    fn id(&self) -> &str {
        &self.inner.id
    }

    fn system_id(&self) -> Option<&str> {
        self.inner.system_id.as_deref()
    }

    async fn send(&self, message: OutgoingMessage) -> ChannelResult<Arc<dyn PlatformMessage>> {
        let id = {
            let mut state = self.inner.state.lock();
            if state.fail_sends {
                return Err(ChannelError::Send("sends disabled".to_string()));
            }
            let id = state.next_id("out");
            state.sent.push((id.clone(), message.clone()));
            id
        };
        debug!("Channel {} sent message {}", self.inner.id, id);

        let content = message.as_text().unwrap_or_default().to_string();
        self.inner.publish(Outbound::Sent {
            id: id.clone(),
            message,
        });

        Ok(Arc::new(MemoryMessage {
            id,
            content,
            sender_id: self
                .inner
                .system_id
                .clone()
                .unwrap_or_else(|| "system".to_string()),
            channel: self.inner.clone(),
        }))
    }

    fn subscribe_messages(&self, filter: MessageFilter) -> Subscription<IncomingMessage> {
        let (sender, subscription) = Subscription::channel();
        let mut state = self.inner.state.lock();
        state.prune();
        state
            .message_subscribers
            .push(MessageSubscriber { filter, sender });
        subscription
    }

    fn subscribe_reactions(
        &self,
        message: &dyn PlatformMessage,
        filter: ReactionFilter,
        timeout: Duration,
    ) -> Subscription<Reaction> {
        let (sender, subscription) = Subscription::channel();
        let mut state = self.inner.state.lock();
        state.prune();
        state.reaction_subscribers.push(ReactionSubscriber {
            message_id: message.id().to_string(),
            filter,
            sender,
            deadline: Instant::now() + timeout,
        });
        subscription
    }
}

/// A message sent through a [`MemoryChannel`].
struct MemoryMessage {
    id: String,
    content: String,
    sender_id: String,
    channel: Arc<Inner>,
}

#[async_trait]
impl PlatformMessage for MemoryMessage {
    fn id(&self) -> &str {
        &self.id
    }

    fn content(&self) -> &str {
        &self.content
    }

    fn sender_id(&self) -> &str {
        &self.sender_id
    }

    async fn edit(&self, message: OutgoingMessage) -> ChannelResult<()> {
        let delay = self.channel.state.lock().edit_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        {
            let mut state = self.channel.state.lock();
            if state.fail_edits {
                return Err(ChannelError::Edit("edits disabled".to_string()));
            }
            state.edits.push((self.id.clone(), message.clone()));
        }
        self.channel.publish(Outbound::Edited {
            id: self.id.clone(),
            message,
        });
        Ok(())
    }

    async fn react(&self, symbol: &str) -> ChannelResult<()> {
        {
            let mut state = self.channel.state.lock();
            if state.fail_reactions {
                return Err(ChannelError::React("reactions disabled".to_string()));
            }
            state.reactions.push((self.id.clone(), symbol.to_string()));
        }
        self.channel.publish(Outbound::Reacted {
            id: self.id.clone(),
            symbol: symbol.to_string(),
        });
        Ok(())
    }
}
