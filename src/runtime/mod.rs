// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Runtime substrate shared by every block.
//!
//! * `channels` - the registry of capacity-1 channels
//! * `env` - what a block sees while being wired and started
//! * `harness` - the per-message processing loop

pub mod channels;
pub mod env;
pub mod harness;

pub use channels::{ChannelPointer, ChannelRegistry, CHANNEL_CAPACITY};
pub use env::BlockEnv;
pub use harness::{start_processing, MessageHandler};
