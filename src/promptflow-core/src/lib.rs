//! Prompt graph engine for chat dialogues.
//!
//! A dialogue is a directed graph of prompts. Each prompt sends a visual (a
//! plain message or a numbered, optionally paginated menu), collects the
//! responder's answers, validates them, and folds the accepted answer into
//! the data carried through the run. Guards on the graph edges decide which
//! prompt comes next.
//!
//! # Architecture
//!
//! ```text
//! PromptRunner ──► PromptGraph ──► Prompt ──► Channel (send, subscribe)
//!       ▲                            │
//!       └────── Collector events ◄───┘
//! ```
//!
//! - [`channel`]: the transport abstraction and an in-memory implementation.
//! - [`menu`]: [`MenuPager`] and its reaction-driven pagination task.
//! - [`prompt`] and [`collector`]: rendering and message classification.
//! - [`node`]: the prompt graph and its guards.
//! - [`runner`]: the traversal loop.
//! - [`registry`]: which channels have a dialogue in progress.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use promptflow_core::{MemoryChannel, Prompt, PromptGraph, PromptRunner, Record, Visual};
//!
//! let mut graph = PromptGraph::new();
//! let ask = graph.add_node(
//!     Prompt::fixed(Visual::message("What is your name?"))
//!         .sync_transform(|m, data: Record| Ok(data.with("name", m.content)))
//!         .build(),
//! );
//!
//! let runner = PromptRunner::new(Arc::new(graph));
//! let data = runner
//!     .run(ask, Arc::new(MemoryChannel::new("general")), Record::new("alice"))
//!     .await?;
//! ```

pub mod channel;
pub mod collector;
pub mod config;
pub mod data;
pub mod error;
pub mod menu;
pub mod node;
pub mod prompt;
pub mod registry;
pub mod rejection;
pub mod runner;
pub mod visual;

pub use channel::{
    Channel, IncomingMessage, MemoryChannel, MessageFilter, Outbound, PlatformMessage, Reaction,
    ReactionFilter, Subscription,
};
pub use collector::Collector;
pub use config::{EngineConfig, InactivityPolicy};
pub use data::{PromptData, Record};
pub use error::{ChannelError, ChannelResult, DialogueError, DialogueResult};
pub use menu::{MenuOption, MenuPager, PageSymbols, SharedPager};
pub use node::{Guard, NodeId, PromptGraph};
pub use prompt::{CollectorEvent, Prompt, PromptBuilder, PromptHooks};
pub use registry::{ChannelLease, ChannelRegistry};
pub use rejection::{Rejection, StepError};
pub use runner::{PromptRunner, RunEvent};
pub use visual::{MenuPage, OutgoingMessage, Visual};
