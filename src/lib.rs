// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod blocks;     // block catalogue and factory
pub mod comm;       // messages and values
pub mod config;     // config loading + graph builder
pub mod engine;     // timer and fan-out machinery
pub mod errors;     // error handling
pub mod expr;       // expression templates
pub mod observability;
pub mod runtime;    // channels, block env, processing harness
