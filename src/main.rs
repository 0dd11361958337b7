// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::env;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use deadmanswitch::config::{load_and_validate_config, RuntimeBuilder};
use deadmanswitch::errors::GraphError;
use deadmanswitch::expr::DefaultVariables;
use deadmanswitch::observability::messages::block::ConfigurationRejected;
use deadmanswitch::observability::messages::StructuredLog;
use deadmanswitch::observability::metrics::TracingMetrics;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Logs every configuration error on its own line.
fn report(error: &GraphError) {
    for error in &error.errors {
        ConfigurationRejected { error }.log();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    init_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        eprintln!("Usage: {} <config.yaml>", args[0]);
        return Ok(ExitCode::FAILURE);
    }

    let config = match load_and_validate_config(&args[1]) {
        Ok(config) => config,
        Err(error) => {
            report(&error);
            return Ok(ExitCode::FAILURE);
        }
    };

    let mut defaults = DefaultVariables::from_process_env();
    for (name, value) in &config.variables {
        defaults.insert(name.clone(), value.clone());
    }

    let mut graph = match RuntimeBuilder::from_config(&config, defaults, Arc::new(TracingMetrics)) {
        Ok(graph) => graph,
        Err(error) => {
            report(&error);
            return Ok(ExitCode::FAILURE);
        }
    };

    // Blocks run forever; any of them returning means the graph is broken.
    // A graph without tasks has nothing to supervise and waits for ctrl-c.
    tokio::select! {
        Some(exited) = graph.supervise() => {
            tracing::error!(block = %exited, "block task exited, stopping");
            graph.shutdown();
            Ok(ExitCode::FAILURE)
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for ctrl-c")?;
            tracing::info!("interrupted, stopping");
            graph.shutdown();
            Ok(ExitCode::SUCCESS)
        }
    }
}
