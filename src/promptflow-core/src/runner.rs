//! Dialogue execution.
//!
//! [`PromptRunner`] walks a [`PromptGraph`] from a root node. Each visit
//! renders the node's visual, collects answers until one is accepted, and
//! then follows the first child whose guard accepts the updated data. The
//! run ends successfully when no child qualifies.
//!
//! # Lifecycle
//!
//! ```text
//! render -> collect -> (reject -> collect)* -> accept -> transform -> next node
//!                   \-> exit | inactivity | error
//! ```
//!
//! Progress is published as [`RunEvent`]s for hosts that want to observe a
//! run without wrapping the channel.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::channel::{Channel, IncomingMessage};
use crate::collector::Collector;
use crate::config::{EngineConfig, InactivityPolicy};
use crate::data::PromptData;
use crate::error::{ChannelError, DialogueError, DialogueResult};
use crate::node::{NodeId, PromptGraph};
use crate::prompt::{CollectorEvent, Prompt};
use crate::registry::ChannelRegistry;
use crate::rejection::{Rejection, StepError};

/// Capacity of the run event channel.
const EVENT_CAPACITY: usize = 64;

/// Progress of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    NodeEntered {
        node: NodeId,
    },
    /// The node's visual was sent as `message_id`.
    Rendered {
        node: NodeId,
        message_id: String,
    },
    Rejected {
        node: NodeId,
        reason: String,
    },
    Accepted {
        node: NodeId,
    },
    Exited {
        node: NodeId,
    },
    TimedOut {
        node: NodeId,
        after: Duration,
    },
    /// Final event of a successful run.
    Completed {
        last: NodeId,
    },
    /// Final event of a failed run, including exit and inactivity.
    Failed {
        node: NodeId,
        kind: &'static str,
        message: String,
    },
}

/// Runs dialogues over a shared graph.
pub struct PromptRunner<D> {
    graph: Arc<PromptGraph<D>>,
    registry: Option<Arc<ChannelRegistry>>,
    policy: InactivityPolicy,
    events: broadcast::Sender<RunEvent>,
}

impl<D> std::fmt::Debug for PromptRunner<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptRunner")
            .field("graph", &self.graph)
            .field("registry", &self.registry.is_some())
            .field("policy", &self.policy)
            .finish()
    }
}

impl<D: PromptData> PromptRunner<D> {
    pub fn new(graph: Arc<PromptGraph<D>>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            graph,
            registry: None,
            policy: InactivityPolicy::default(),
            events,
        }
    }

    /// Mark channels busy in `registry` while a run is in progress.
    pub fn with_registry(mut self, registry: Arc<ChannelRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_policy(mut self, policy: InactivityPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_config(self, config: &EngineConfig) -> Self {
        self.with_policy(config.collector.inactivity_policy)
    }

    pub fn graph(&self) -> &Arc<PromptGraph<D>> {
        &self.graph
    }

    pub fn policy(&self) -> InactivityPolicy {
        self.policy
    }

    /// Receive the events of every subsequent run.
    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.events.subscribe()
    }

    /// Run the dialogue from `root` and return the final data.
    pub async fn run(
        &self,
        root: NodeId,
        channel: Arc<dyn Channel>,
        data: D,
    ) -> DialogueResult<D> {
        let _lease = self.registry.as_ref().map(|r| r.mark(channel.id()));
        info!(
            "Starting dialogue on channel {} for {} at node {}",
            channel.id(),
            data.responder_id(),
            root
        );

        let mut current = root;
        let mut data = data;
        let result = loop {
            data = match self.visit(current, &channel, data).await {
                Ok(updated) => updated,
                Err(e) => break Err(e),
            };
            match self.graph.next_node(current, &data).await {
                Ok(Some(next)) => {
                    debug!("Node {} continues to {}", current, next);
                    current = next;
                }
                Ok(None) => break Ok(data),
                Err(e) => break Err(e),
            }
        };

        match &result {
            Ok(_) => {
                info!("Dialogue on channel {} completed at node {}", channel.id(), current);
                self.emit(RunEvent::Completed { last: current });
            }
            Err(e) => {
                if e.is_expected() {
                    info!("Dialogue on channel {} ended: {}", channel.id(), e);
                } else {
                    warn!("Dialogue on channel {} failed at node {}: {}", channel.id(), current, e);
                }
                self.emit(RunEvent::Failed {
                    node: current,
                    kind: e.kind(),
                    message: e.to_string(),
                });
            }
        }
        result
    }

    /// Render `node` and collect until an answer is accepted.
    async fn visit(&self, node: NodeId, channel: &Arc<dyn Channel>, data: D) -> DialogueResult<D> {
        self.emit(RunEvent::NodeEntered { node });
        let prompt = Arc::clone(self.graph.prompt(node)?);
        let visual = prompt.get_visual(&data).await?.fresh().await;

        if !prompt.has_transform() {
            let sent = prompt.send_visual(channel, &visual).await?;
            debug!("Node {} is display-only", node);
            self.emit(RunEvent::Rendered {
                node,
                message_id: sent.message.id().to_string(),
            });
            return Ok(data);
        }

        // Subscribe before sending so an immediate answer is not lost.
        let mut collector = prompt.create_collector(channel.as_ref(), data);
        let sent = match prompt.send_visual(channel, &visual).await {
            Ok(sent) => sent,
            Err(e) => {
                collector.stop();
                return Err(e.into());
            }
        };
        self.emit(RunEvent::Rendered {
            node,
            message_id: sent.message.id().to_string(),
        });

        let outcome = self
            .collect(node, &prompt, &mut collector, channel.as_ref())
            .await;
        collector.stop();
        // Ends pagination for this visit.
        drop(sent);
        outcome
    }

    async fn collect(
        &self,
        node: NodeId,
        prompt: &Prompt<D>,
        collector: &mut Collector<D>,
        channel: &dyn Channel,
    ) -> DialogueResult<D> {
        loop {
            let event = match tokio::time::timeout_at(collector.deadline(), collector.next_event())
                .await
            {
                Ok(Some(event)) => event,
                Ok(None) => return Err(ChannelError::Closed.into()),
                Err(_) => {
                    collector.stop();
                    let after = prompt.duration();
                    debug!("Node {} timed out after {:?}", node, after);
                    self.emit(RunEvent::TimedOut { node, after });
                    if let Err(e) = prompt.on_inactivity(channel, collector.data()).await {
                        warn!("Failed to send inactivity notice: {}", e);
                    }
                    return Err(DialogueError::Inactivity { after });
                }
            };

            match event {
                CollectorEvent::Reject(message, rejection) => {
                    self.reject(node, prompt, collector, channel, &message, rejection)
                        .await?;
                }
                CollectorEvent::Message(message) => {
                    let data = collector.data().clone();
                    match prompt.apply_transform(message.clone(), data).await {
                        Ok(updated) => {
                            collector.stop();
                            debug!("Node {} accepted message {}", node, message.id);
                            self.emit(RunEvent::Accepted { node });
                            return Ok(updated);
                        }
                        Err(StepError::Rejected(rejection)) => {
                            self.reject(node, prompt, collector, channel, &message, rejection)
                                .await?;
                        }
                        Err(StepError::Failed(e)) => {
                            collector.stop();
                            return Err(DialogueError::Unexpected(e));
                        }
                    }
                }
                CollectorEvent::Exit(message) => {
                    collector.stop();
                    debug!("Node {} exited by {}", node, message.author_id);
                    self.emit(RunEvent::Exited { node });
                    if let Err(e) = prompt.on_exit(&message, channel, collector.data()).await {
                        warn!("Failed to send exit notice: {}", e);
                    }
                    return Err(DialogueError::VoluntaryExit);
                }
                CollectorEvent::Error(e) => {
                    collector.stop();
                    return Err(DialogueError::Unexpected(e));
                }
            }
        }
    }

    async fn reject(
        &self,
        node: NodeId,
        prompt: &Prompt<D>,
        collector: &mut Collector<D>,
        channel: &dyn Channel,
        message: &IncomingMessage,
        rejection: Rejection,
    ) -> DialogueResult<()> {
        debug!("Node {} rejected {:?}: {}", node, message.content, rejection);
        self.emit(RunEvent::Rejected {
            node,
            reason: rejection.message().to_string(),
        });
        prompt
            .on_reject(&rejection, message, channel, collector.data())
            .await?;
        if self.policy == InactivityPolicy::ResetOnReject {
            collector.reset_deadline();
        }
        Ok(())
    }

    fn emit(&self, event: RunEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::MemoryChannel;
    use crate::data::Record;
    use crate::visual::Visual;
    use pretty_assertions::assert_eq;

    fn drain(rx: &mut broadcast::Receiver<RunEvent>) -> Vec<RunEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_display_only_nodes_do_not_collect() {
        let mut graph = PromptGraph::new();
        let hello = graph.add_node(Prompt::fixed(Visual::message("Hello")).build());
        let bye = graph.add_node(Prompt::fixed(Visual::message("Bye")).build());
        graph.add_child(hello, bye).unwrap();

        let channel = MemoryChannel::new("c");
        let runner = PromptRunner::new(Arc::new(graph));
        let mut events = runner.subscribe();

        let data = runner
            .run(hello, Arc::new(channel.clone()), Record::new("u"))
            .await
            .unwrap();

        assert_eq!(data, Record::new("u"));
        assert_eq!(channel.sent_texts(), vec!["Hello", "Bye"]);
        assert_eq!(channel.active_message_subscriptions(), 0);
        assert_eq!(
            drain(&mut events).last(),
            Some(&RunEvent::Completed { last: bye })
        );
    }

    #[tokio::test]
    async fn test_send_failure_is_channel_error() {
        let mut graph = PromptGraph::new();
        let ask = graph.add_node(
            Prompt::fixed(Visual::message("name?"))
                .sync_transform(|_, data| Ok(data))
                .build(),
        );
        let channel = MemoryChannel::new("c");
        channel.set_fail_sends(true);

        let registry = ChannelRegistry::new();
        let runner = PromptRunner::new(Arc::new(graph)).with_registry(registry.clone());
        let mut events = runner.subscribe();

        let err = runner
            .run(ask, Arc::new(channel.clone()), Record::new("u"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "channel");
        assert!(!err.is_expected());
        assert!(registry.is_empty());
        assert_eq!(channel.active_message_subscriptions(), 0);
        assert!(matches!(
            drain(&mut events).last(),
            Some(RunEvent::Failed { kind: "channel", .. })
        ));
    }

    #[tokio::test]
    async fn test_unknown_root() {
        let graph = PromptGraph::<Record>::new();
        let mut other = PromptGraph::<Record>::new();
        let foreign = other.add_node(Prompt::fixed(Visual::message("x")).build());

        let runner = PromptRunner::new(Arc::new(graph));
        let err = runner
            .run(foreign, Arc::new(MemoryChannel::new("c")), Record::new("u"))
            .await
            .unwrap_err();
        assert!(matches!(err, DialogueError::UnknownNode(0)));
    }

    #[test]
    fn test_with_config_sets_policy() {
        let mut config = EngineConfig::default();
        config.collector.inactivity_policy = InactivityPolicy::ResetOnReject;
        let runner = PromptRunner::<Record>::new(Arc::new(PromptGraph::new())).with_config(&config);
        assert_eq!(runner.policy(), InactivityPolicy::ResetOnReject);
    }
}
