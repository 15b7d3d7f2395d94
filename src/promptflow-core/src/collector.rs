//! Message collection for a single prompt.

use std::sync::Arc;

use tokio::time::Instant;
use tracing::trace;

use crate::channel::{IncomingMessage, Subscription};
use crate::data::PromptData;
use crate::prompt::{CollectorEvent, Prompt};

/// Open subscription to the responder's messages, classified by a prompt.
///
/// Events are produced one at a time, so a message is fully classified
/// before the next one is read. After [`stop`](Collector::stop) no further
/// events are emitted, including for messages already queued.
pub struct Collector<D> {
    prompt: Arc<Prompt<D>>,
    data: D,
    subscription: Subscription<IncomingMessage>,
    started_at: Instant,
    deadline: Instant,
}

impl<D: PromptData> Collector<D> {
    pub(crate) fn new(
        prompt: Arc<Prompt<D>>,
        data: D,
        subscription: Subscription<IncomingMessage>,
    ) -> Self {
        let started_at = Instant::now();
        let deadline = started_at + prompt.duration();
        Self {
            prompt,
            data,
            subscription,
            started_at,
            deadline,
        }
    }

    /// Next classified event. `None` once the collector is stopped or the
    /// transport ended the subscription.
    pub async fn next_event(&mut self) -> Option<CollectorEvent> {
        let message = self.subscription.recv().await?;
        if self.is_stopped() {
            return None;
        }
        trace!("Collector received message {}", message.id);
        Some(self.prompt.handle_message(message, &self.data).await)
    }

    /// Moment the inactivity outcome fires.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Restart the inactivity window from now.
    pub fn reset_deadline(&mut self) {
        self.deadline = Instant::now() + self.prompt.duration();
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn data(&self) -> &D {
        &self.data
    }

    pub fn prompt(&self) -> &Arc<Prompt<D>> {
        &self.prompt
    }

    pub fn stop(&mut self) {
        self.subscription.stop();
    }

    pub fn is_stopped(&self) -> bool {
        self.subscription.is_stopped()
    }
}

impl<D> std::fmt::Debug for Collector<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collector")
            .field("started_at", &self.started_at)
            .field("deadline", &self.deadline)
            .field("stopped", &self.subscription.is_stopped())
            .finish()
    }
}
