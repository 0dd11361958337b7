// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::comm::Message;

/// Every channel holds at most one message; senders wait for the reader.
pub const CHANNEL_CAPACITY: usize = 1;

/// Opaque name of a registered channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelPointer(String);

impl ChannelPointer {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

struct Slot {
    sender: mpsc::Sender<Message>,
    receiver: Option<mpsc::Receiver<Message>>,
}

/// Owns every channel of the graph, keyed by [`ChannelPointer`].
///
/// Written while the graph is built and read-only afterwards. Resolving a
/// pointer this registry never handed out is a programming error and panics.
#[derive(Default)]
pub struct ChannelRegistry {
    next_id: u64,
    channels: HashMap<ChannelPointer, Slot>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new capacity-1 channel under the next sequential id.
    pub fn new_channel(&mut self) -> ChannelPointer {
        self.next_id += 1;
        let pointer = ChannelPointer(format!("ch{}", self.next_id));
        let (sender, receiver) = mpsc::channel(CHANNEL_CAPACITY);
        self.channels.insert(
            pointer.clone(),
            Slot {
                sender,
                receiver: Some(receiver),
            },
        );
        pointer
    }

    /// Send end of a registered channel. Can be resolved any number of times.
    ///
    /// # Panics
    /// If `pointer` was not allocated by this registry.
    pub fn resolve_send(&self, pointer: &ChannelPointer) -> mpsc::Sender<Message> {
        match self.channels.get(pointer) {
            Some(slot) => slot.sender.clone(),
            None => panic!("channel '{}' not found", pointer),
        }
    }

    /// Receive end of a registered channel. Each channel has a single reader.
    ///
    /// # Panics
    /// If `pointer` was not allocated by this registry, or its receive end
    /// was already taken.
    pub fn resolve_receive(&mut self, pointer: &ChannelPointer) -> mpsc::Receiver<Message> {
        let slot = match self.channels.get_mut(pointer) {
            Some(slot) => slot,
            None => panic!("channel '{}' not found", pointer),
        };
        match slot.receiver.take() {
            Some(receiver) => receiver,
            None => panic!("channel '{}' already has a reader", pointer),
        }
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}
