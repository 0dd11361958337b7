// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod block;
mod config;

pub use block::{BlockError, EvalError};
pub use config::{ConfigError, GraphError};
