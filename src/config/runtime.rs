// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::sync::Arc;

use crate::blocks::{Block, BlockFactory};
use crate::config::{validate_config, Config};
use crate::errors::GraphError;
use crate::expr::DefaultVariables;
use crate::observability::messages::block::{BlockStarted, GraphStarted};
use crate::observability::messages::StructuredLog;
use crate::observability::metrics::MetricsSink;
use crate::runtime::BlockEnv;

/// Block graph builder - turns a validated configuration into running blocks.
///
/// Building goes through four phases, each over every block before the next
/// one starts:
///
/// 1. create each block and bind its input channel
/// 2. configure each block from its settings
/// 3. check that every block reference names a block with an input
/// 4. start each block
///
/// Errors from phases 1 to 3 are accumulated and reported together. A
/// failing start stops the build and aborts the blocks already running.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use deadmanswitch::config::{Config, RuntimeBuilder};
/// use deadmanswitch::expr::DefaultVariables;
/// use deadmanswitch::observability::metrics::TracingMetrics;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let config: Config = serde_yaml::from_str(r#"
/// blocks:
///   - type: timer
///     id: watchdog
///     timeout: 30s
///     on_timeout: alarm
///   - type: log
///     id: alarm
/// "#).unwrap();
///
/// let env = RuntimeBuilder::from_config(&config, DefaultVariables::new(), Arc::new(TracingMetrics)).unwrap();
/// assert_eq!(env.task_count(), 2);
/// # }
/// ```
pub struct RuntimeBuilder;

impl RuntimeBuilder {
    /// Build and start the block graph described by `cfg`.
    ///
    /// Must be called from within a Tokio runtime; the returned [`BlockEnv`]
    /// owns the block tasks.
    pub fn from_config(
        cfg: &Config,
        defaults: DefaultVariables,
        metrics: Arc<dyn MetricsSink>,
    ) -> Result<BlockEnv, GraphError> {
        validate_config(cfg).map_err(|errors| GraphError { errors })?;

        let mut env = BlockEnv::new(defaults, metrics);
        let mut errors = Vec::new();

        let mut blocks: Vec<Box<dyn Block>> = Vec::with_capacity(cfg.blocks.len());
        let mut settings = Vec::with_capacity(cfg.blocks.len());
        for (index, block_config) in cfg.blocks.iter().enumerate() {
            let block_id = block_config.id_or_default(index);
            let mut block = BlockFactory::create_block(&block_config.block_type)?;
            block.set_id(block_id.clone());
            let input = block.bind(&mut env);
            env.declare_block(&block_id, input);
            blocks.push(block);
            settings.push(block_config.settings_value());
        }

        for (block, settings) in blocks.iter_mut().zip(settings) {
            if let Err(error) = block.configure(settings) {
                errors.push(error);
                continue;
            }
            errors.extend(
                block
                    .references()
                    .into_iter()
                    .filter_map(|reference| {
                        env.check_reference(block.id(), reference.as_str()).err()
                    }),
            );
        }

        if !errors.is_empty() {
            return Err(GraphError { errors });
        }

        let block_count = blocks.len();
        for block in blocks {
            let block_id = block.id().to_string();
            let block_type = block.block_type();
            let span = tracing::info_span!("block", block = %block_id, block_type);
            if let Err(error) = span.in_scope(|| block.start(&mut env)) {
                env.shutdown();
                return Err(error.into());
            }
            BlockStarted {
                block_id: &block_id,
                block_type,
            }
            .log();
        }

        GraphStarted {
            block_count,
            channel_count: env.channel_count(),
        }
        .log();
        Ok(env)
    }
}
