//! Busy-channel bookkeeping.
//!
//! Hosts use a [`ChannelRegistry`] to know which channels currently have a
//! dialogue running, for example to refuse starting a second one. The
//! registry is shared behind an `Arc`; a [`ChannelLease`] marks a channel
//! busy until it is dropped.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

/// Set of channel ids with an active dialogue.
#[derive(Debug, Default)]
pub struct ChannelRegistry {
    // Lease count per channel.
    active: Mutex<HashMap<String, usize>>,
}

impl ChannelRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Mark `channel_id` busy, even if it already is.
    pub fn mark(self: &Arc<Self>, channel_id: &str) -> ChannelLease {
        *self
            .active
            .lock()
            .entry(channel_id.to_string())
            .or_insert(0) += 1;
        ChannelLease {
            registry: Arc::clone(self),
            channel_id: channel_id.to_string(),
        }
    }

    /// Mark `channel_id` busy unless it already is.
    pub fn try_acquire(self: &Arc<Self>, channel_id: &str) -> Option<ChannelLease> {
        let mut active = self.active.lock();
        if active.contains_key(channel_id) {
            return None;
        }
        active.insert(channel_id.to_string(), 1);
        Some(ChannelLease {
            registry: Arc::clone(self),
            channel_id: channel_id.to_string(),
        })
    }

    pub fn is_active(&self, channel_id: &str) -> bool {
        self.active.lock().contains_key(channel_id)
    }

    /// Busy channel ids, sorted.
    pub fn active_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.active.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.active.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.lock().is_empty()
    }

    fn release(&self, channel_id: &str) {
        let mut active = self.active.lock();
        if let Some(count) = active.get_mut(channel_id) {
            *count -= 1;
            if *count == 0 {
                active.remove(channel_id);
            }
        }
    }
}

/// Keeps a channel marked busy. Released on drop.
#[derive(Debug)]
pub struct ChannelLease {
    registry: Arc<ChannelRegistry>,
    channel_id: String,
}

impl ChannelLease {
    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }
}

impl Drop for ChannelLease {
    fn drop(&mut self) {
        self.registry.release(&self.channel_id);
    }
}
