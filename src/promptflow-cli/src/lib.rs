//! Terminal host for promptflow dialogues.
//!
//! Runs one of the bundled [`demos`] over a
//! [`MemoryChannel`](promptflow_core::MemoryChannel) wired to stdin/stdout by
//! [`terminal`].

pub mod demos;
pub mod terminal;

pub use demos::{Demo, DemoGraph};
