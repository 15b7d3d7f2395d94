//! Prompts: one question of a dialogue.
//!
//! A [`Prompt`] binds a visual source to an optional transform. It knows how
//! to open a [`Collector`] for itself, how to classify an inbound message
//! (exit, menu rejection, or candidate answer) and what to send when the
//! user is rejected, goes quiet, or leaves.
//!
//! # Example
//!
//! ```rust,ignore
//! use promptflow_core::{Prompt, Record, StepError, Visual};
//!
//! let ask_age = Prompt::<Record>::generated(|_| Visual::message("How old are you?"))
//!     .transform(|message, data| async move {
//!         let age: i64 = message
//!             .content
//!             .trim()
//!             .parse()
//!             .map_err(|_| StepError::reject("That's not a valid number, try again."))?;
//!         Ok(data.with("age", age))
//!     })
//!     .build();
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::debug;

use crate::channel::{Channel, IncomingMessage, MessageFilter, PlatformMessage};
use crate::collector::Collector;
use crate::config::{DEFAULT_EXIT_TOKEN, DEFAULT_TIMEOUT_SECS, EngineConfig, MessagesConfig};
use crate::data::PromptData;
use crate::error::ChannelResult;
use crate::menu::{PaginationHandle, SharedPager, spawn_pagination};
use crate::rejection::{Rejection, StepError};
use crate::visual::Visual;

type VisualFn<D> = Arc<dyn Fn(&D) -> BoxFuture<'static, anyhow::Result<Visual>> + Send + Sync>;
type TransformFn<D> =
    Arc<dyn Fn(IncomingMessage, D) -> BoxFuture<'static, Result<D, StepError>> + Send + Sync>;

/// Where a prompt's visual comes from.
enum VisualSource<D> {
    Static(Visual),
    Generated(VisualFn<D>),
}

/// Outcome of classifying one inbound message.
#[derive(Debug)]
pub enum CollectorEvent {
    /// Candidate answer. The transform may still reject it.
    Message(IncomingMessage),
    /// Invalid input; re-prompt.
    Reject(IncomingMessage, Rejection),
    /// The user typed the exit token.
    Exit(IncomingMessage),
    /// Classification itself failed.
    Error(anyhow::Error),
}

/// Visuals sent by the default lifecycle hooks, and the rejection used for
/// invalid menu selections.
#[derive(Clone)]
pub struct PromptHooks {
    reject_visual: Arc<dyn Fn(&Rejection) -> Visual + Send + Sync>,
    inactivity_visual: Arc<dyn Fn() -> Visual + Send + Sync>,
    exit_visual: Arc<dyn Fn() -> Visual + Send + Sync>,
    menu_rejection: Arc<dyn Fn(&IncomingMessage) -> Rejection + Send + Sync>,
}

impl Default for PromptHooks {
    fn default() -> Self {
        Self::from_messages(&MessagesConfig::default())
    }
}

impl PromptHooks {
    /// Hooks sending the texts in `messages`. Rejections show their own text.
    pub fn from_messages(messages: &MessagesConfig) -> Self {
        let inactivity = messages.inactivity.clone();
        let exit = messages.exit.clone();
        let invalid_option = messages.invalid_option.clone();
        Self {
            reject_visual: Arc::new(|rejection: &Rejection| Visual::message(rejection.message())),
            inactivity_visual: Arc::new(move || Visual::message(inactivity.clone())),
            exit_visual: Arc::new(move || Visual::message(exit.clone())),
            menu_rejection: Arc::new(move |_: &IncomingMessage| {
                Rejection::new(invalid_option.clone())
            }),
        }
    }

    pub fn with_reject_visual<F>(mut self, f: F) -> Self
    where
        F: Fn(&Rejection) -> Visual + Send + Sync + 'static,
    {
        self.reject_visual = Arc::new(f);
        self
    }

    pub fn with_inactivity_visual<F>(mut self, f: F) -> Self
    where
        F: Fn() -> Visual + Send + Sync + 'static,
    {
        self.inactivity_visual = Arc::new(f);
        self
    }

    pub fn with_exit_visual<F>(mut self, f: F) -> Self
    where
        F: Fn() -> Visual + Send + Sync + 'static,
    {
        self.exit_visual = Arc::new(f);
        self
    }

    pub fn with_menu_rejection<F>(mut self, f: F) -> Self
    where
        F: Fn(&IncomingMessage) -> Rejection + Send + Sync + 'static,
    {
        self.menu_rejection = Arc::new(f);
        self
    }

    pub fn reject_visual(&self, rejection: &Rejection) -> Visual {
        (self.reject_visual)(rejection)
    }

    pub fn inactivity_visual(&self) -> Visual {
        (self.inactivity_visual)()
    }

    pub fn exit_visual(&self) -> Visual {
        (self.exit_visual)()
    }

    pub fn menu_rejection(&self, message: &IncomingMessage) -> Rejection {
        (self.menu_rejection)(message)
    }
}

/// A visual sent to the channel, with its pagination task if it has one.
pub struct SentVisual {
    pub message: Arc<dyn PlatformMessage>,
    pub pagination: Option<PaginationHandle>,
}

/// One step of a dialogue.
pub struct Prompt<D> {
    visual: VisualSource<D>,
    transform: Option<TransformFn<D>>,
    hooks: PromptHooks,
    duration: Duration,
    exit_token: String,
}

impl<D> std::fmt::Debug for Prompt<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Prompt")
            .field(
                "visual",
                &match self.visual {
                    VisualSource::Static(_) => "static",
                    VisualSource::Generated(_) => "generated",
                },
            )
            .field("has_transform", &self.transform.is_some())
            .field("duration", &self.duration)
            .field("exit_token", &self.exit_token)
            .finish()
    }
}

impl<D: PromptData> Prompt<D> {
    /// Prompt always showing `visual`.
    pub fn fixed(visual: Visual) -> PromptBuilder<D> {
        PromptBuilder::new(VisualSource::Static(visual))
    }

    /// Prompt whose visual is computed from the current data.
    pub fn generated<F>(generator: F) -> PromptBuilder<D>
    where
        F: Fn(&D) -> Visual + Send + Sync + 'static,
    {
        let generator: VisualFn<D> = Arc::new(move |data: &D| {
            let visual = generator(data);
            async move { Ok::<_, anyhow::Error>(visual) }.boxed()
        });
        PromptBuilder::new(VisualSource::Generated(generator))
    }

    /// Prompt whose visual is computed asynchronously and may fail.
    pub fn generated_async<F, Fut>(generator: F) -> PromptBuilder<D>
    where
        F: Fn(&D) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Visual>> + Send + 'static,
    {
        let generator: VisualFn<D> = Arc::new(move |data: &D| generator(data).boxed());
        PromptBuilder::new(VisualSource::Generated(generator))
    }

    /// Whether this prompt collects an answer. Prompts without a transform
    /// only display their visual.
    pub fn has_transform(&self) -> bool {
        self.transform.is_some()
    }

    /// Collection window before the inactivity outcome.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn exit_token(&self) -> &str {
        &self.exit_token
    }

    pub fn hooks(&self) -> &PromptHooks {
        &self.hooks
    }

    /// Visual for `data`.
    pub async fn get_visual(&self, data: &D) -> anyhow::Result<Visual> {
        match &self.visual {
            VisualSource::Static(visual) => Ok(visual.clone()),
            VisualSource::Generated(generator) => generator(data).await,
        }
    }

    /// Send `visual`, starting pagination for menus that support it.
    pub async fn send_visual(
        &self,
        channel: &Arc<dyn Channel>,
        visual: &Visual,
    ) -> ChannelResult<SentVisual> {
        let message = channel.send(visual.to_outgoing().await).await?;

        let pagination = match visual.pager() {
            Some(pager) if pager.lock().await.can_paginate() => Some(spawn_pagination(
                pager.clone(),
                message.clone(),
                channel.clone(),
            )),
            _ => None,
        };

        Ok(SentVisual {
            message,
            pagination,
        })
    }

    /// Open a collector listening to the responder stored in `data`.
    pub fn create_collector(self: &Arc<Self>, channel: &dyn Channel, data: D) -> Collector<D> {
        let filter = MessageFilter::new(data.responder_id(), channel.system_id());
        let subscription = channel.subscribe_messages(filter);
        Collector::new(self.clone(), data, subscription)
    }

    /// Classify an inbound message.
    pub async fn handle_message(&self, message: IncomingMessage, data: &D) -> CollectorEvent {
        if message.content == self.exit_token {
            return CollectorEvent::Exit(message);
        }
        match self.get_visual(data).await {
            Ok(Visual::Menu { pager, .. }) => self.handle_menu_message(message, &pager).await,
            Ok(Visual::Message { .. }) => CollectorEvent::Message(message),
            Err(e) => CollectorEvent::Error(e),
        }
    }

    /// Classify an answer to a menu.
    pub async fn handle_menu_message(
        &self,
        message: IncomingMessage,
        pager: &SharedPager,
    ) -> CollectorEvent {
        let valid = pager.lock().await.is_valid_selection(&message.content);
        if valid {
            CollectorEvent::Message(message)
        } else {
            debug!("Invalid menu selection {:?}", message.content);
            let rejection = self.hooks.menu_rejection(&message);
            CollectorEvent::Reject(message, rejection)
        }
    }

    /// Run the transform. Display-only prompts return `data` unchanged.
    pub async fn apply_transform(&self, message: IncomingMessage, data: D) -> Result<D, StepError> {
        match &self.transform {
            Some(transform) => transform(message, data).await,
            None => Ok(data),
        }
    }

    /// Tell the user their input was rejected.
    pub async fn on_reject(
        &self,
        rejection: &Rejection,
        _message: &IncomingMessage,
        channel: &dyn Channel,
        _data: &D,
    ) -> ChannelResult<()> {
        self.send(channel, &self.hooks.reject_visual(rejection))
            .await
    }

    /// Tell the user the dialogue closed for inactivity.
    pub async fn on_inactivity(&self, channel: &dyn Channel, _data: &D) -> ChannelResult<()> {
        self.send(channel, &self.hooks.inactivity_visual()).await
    }

    /// Tell the user the dialogue closed at their request.
    pub async fn on_exit(
        &self,
        _message: &IncomingMessage,
        channel: &dyn Channel,
        _data: &D,
    ) -> ChannelResult<()> {
        self.send(channel, &self.hooks.exit_visual()).await
    }

    async fn send(&self, channel: &dyn Channel, visual: &Visual) -> ChannelResult<()> {
        channel.send(visual.to_outgoing().await).await.map(|_| ())
    }
}

/// Builder for [`Prompt`].
pub struct PromptBuilder<D> {
    visual: VisualSource<D>,
    transform: Option<TransformFn<D>>,
    hooks: PromptHooks,
    duration: Duration,
    exit_token: String,
}

impl<D: PromptData> PromptBuilder<D> {
    fn new(visual: VisualSource<D>) -> Self {
        Self {
            visual,
            transform: None,
            hooks: PromptHooks::default(),
            duration: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            exit_token: DEFAULT_EXIT_TOKEN.to_string(),
        }
    }

    /// Asynchronous transform from (message, data) to new data.
    pub fn transform<F, Fut>(mut self, transform: F) -> Self
    where
        F: Fn(IncomingMessage, D) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<D, StepError>> + Send + 'static,
    {
        self.transform = Some(Arc::new(move |message: IncomingMessage, data: D| {
            transform(message, data).boxed()
        }));
        self
    }

    /// Synchronous transform.
    pub fn sync_transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(IncomingMessage, D) -> Result<D, StepError> + Send + Sync + 'static,
    {
        self.transform = Some(Arc::new(move |message: IncomingMessage, data: D| {
            let result = transform(message, data);
            async move { result }.boxed()
        }));
        self
    }

    /// Take timeout, exit token and hook texts from `config`.
    pub fn config(mut self, config: &EngineConfig) -> Self {
        self.duration = config.collector.timeout();
        self.exit_token = config.collector.exit_token.clone();
        self.hooks = PromptHooks::from_messages(&config.messages);
        self
    }

    pub fn hooks(mut self, hooks: PromptHooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn exit_token(mut self, token: impl Into<String>) -> Self {
        self.exit_token = token.into();
        self
    }

    pub fn build(self) -> Prompt<D> {
        Prompt {
            visual: self.visual,
            transform: self.transform,
            hooks: self.hooks,
            duration: self.duration,
            exit_token: self.exit_token,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::MemoryChannel;
    use crate::data::Record;
    use crate::menu::MenuPager;
    use pretty_assertions::assert_eq;

    fn menu_prompt() -> Prompt<Record> {
        let pager = MenuPager::new()
            .option("a", Some("b"))
            .option("a", Some("b"))
            .option("a", Some("b"));
        Prompt::fixed(Visual::menu(pager))
            .sync_transform(|m, data: Record| Ok(data.with("choice", m.content)))
            .build()
    }

    #[tokio::test]
    async fn test_exit_token_wins_over_everything() {
        let prompt = menu_prompt();
        let event = prompt
            .handle_message(IncomingMessage::new("u", "exit"), &Record::new("u"))
            .await;
        assert!(matches!(event, CollectorEvent::Exit(m) if m.content == "exit"));
    }

    #[tokio::test]
    async fn test_plain_visual_emits_message() {
        let prompt = Prompt::<Record>::fixed(Visual::message("What is your name?")).build();
        let event = prompt
            .handle_message(IncomingMessage::new("u", "Alice"), &Record::new("u"))
            .await;
        assert!(matches!(event, CollectorEvent::Message(m) if m.content == "Alice"));
    }

    #[tokio::test]
    async fn test_menu_rejects_invalid_selection() {
        let prompt = menu_prompt();
        let data = Record::new("u");

        match prompt
            .handle_message(IncomingMessage::new("u", "4"), &data)
            .await
        {
            CollectorEvent::Reject(m, rejection) => {
                assert_eq!(m.content, "4");
                assert_eq!(rejection.message(), "That is an invalid option. Try again.");
            }
            other => panic!("expected reject, got {:?}", other),
        }

        let event = prompt
            .handle_message(IncomingMessage::new("u", "3"), &data)
            .await;
        assert!(matches!(event, CollectorEvent::Message(_)));
    }

    #[tokio::test]
    async fn test_custom_menu_rejection() {
        let pager = MenuPager::new().option("only", None);
        let prompt = Prompt::<Record>::fixed(Visual::menu(pager))
            .hooks(
                PromptHooks::default()
                    .with_menu_rejection(|m| Rejection::new(format!("{} is not on the menu", m.content))),
            )
            .build();

        let event = prompt
            .handle_message(IncomingMessage::new("u", "7"), &Record::new("u"))
            .await;
        assert!(
            matches!(event, CollectorEvent::Reject(_, r) if r.message() == "7 is not on the menu")
        );
    }

    #[tokio::test]
    async fn test_visual_failure_becomes_error_event() {
        let prompt = Prompt::<Record>::generated_async(|_| async {
            Err(anyhow::anyhow!("template missing"))
        })
        .build();
        let event = prompt
            .handle_message(IncomingMessage::new("u", "hi"), &Record::new("u"))
            .await;
        assert!(matches!(event, CollectorEvent::Error(e) if e.to_string() == "template missing"));
    }

    #[tokio::test]
    async fn test_generated_visual_sees_data() {
        let prompt = Prompt::<Record>::generated(|data| {
            Visual::message(format!("Hi {}", data.get_str("name").unwrap_or("stranger")))
        })
        .build();
        let visual = prompt
            .get_visual(&Record::new("u").with("name", "Alice"))
            .await
            .unwrap();
        assert_eq!(visual.to_outgoing().await.as_text(), Some("Hi Alice"));
    }

    #[tokio::test]
    async fn test_transform_rejection_and_passthrough() {
        let prompt = Prompt::<Record>::fixed(Visual::message("age?"))
            .transform(|m, data| async move {
                let age: i64 = m
                    .content
                    .parse()
                    .map_err(|_| StepError::reject("That's not a valid number, try again."))?;
                Ok(data.with("age", age))
            })
            .build();

        let data = Record::new("u");
        let err = prompt
            .apply_transform(IncomingMessage::new("u", "abc"), data.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, StepError::Rejected(_)));

        let updated = prompt
            .apply_transform(IncomingMessage::new("u", "30"), data.clone())
            .await
            .unwrap();
        assert_eq!(updated.get_i64("age"), Some(30));

        let display_only = Prompt::<Record>::fixed(Visual::message("bye")).build();
        assert!(!display_only.has_transform());
        let same = display_only
            .apply_transform(IncomingMessage::new("u", "x"), data.clone())
            .await
            .unwrap();
        assert_eq!(same, data);
    }

    #[tokio::test]
    async fn test_default_hooks_send_texts() {
        let channel = MemoryChannel::new("hooks");
        let prompt = Prompt::<Record>::fixed(Visual::message("q")).build();
        let data = Record::new("u");
        let message = IncomingMessage::new("u", "x");

        prompt
            .on_reject(&Rejection::new("Try again."), &message, &channel, &data)
            .await
            .unwrap();
        prompt.on_inactivity(&channel, &data).await.unwrap();
        prompt.on_exit(&message, &channel, &data).await.unwrap();

        assert_eq!(
            channel.sent_texts(),
            vec![
                "Try again.",
                "Menu has been closed due to inactivity.",
                "Menu closed."
            ]
        );
    }

    #[tokio::test]
    async fn test_config_applies_texts_and_timeout() {
        let mut config = EngineConfig::default();
        config.collector.timeout_secs = 5;
        config.collector.exit_token = "quit".into();
        config.messages.exit = "Goodbye.".into();

        let prompt = Prompt::<Record>::fixed(Visual::message("q"))
            .config(&config)
            .build();
        assert_eq!(prompt.duration(), Duration::from_secs(5));
        assert_eq!(prompt.exit_token(), "quit");
        assert_eq!(prompt.hooks().exit_visual().to_outgoing().await.as_text(), Some("Goodbye."));

        let event = prompt
            .handle_message(IncomingMessage::new("u", "exit"), &Record::new("u"))
            .await;
        assert!(matches!(event, CollectorEvent::Message(_)));
    }
}
