// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::errors::ConfigError;

use super::*;

type Constructor = fn() -> Box<dyn Block>;

/// Every block type the configuration can name.
fn registry() -> [(&'static str, Constructor); 10] {
    [
        ("timer", || Box::new(TimerBlock::default())),
        ("dead_mans_switch", || Box::new(DeadMansSwitchBlock::default())),
        ("mux", || Box::new(MuxBlock::default())),
        ("splitter", || Box::new(SplitterBlock::default())),
        ("split", || Box::new(SplitBlock::default())),
        ("map", || Box::new(MapBlock::default())),
        ("deduplicate", || Box::new(DeduplicateBlock::default())),
        ("log", || Box::new(LogBlock::default())),
        ("http_server", || Box::new(HttpServerBlock::default())),
        ("http_request", || Box::new(HttpRequestBlock::default())),
    ]
}

/// Creates blocks by type name.
pub struct BlockFactory;

impl BlockFactory {
    /// Create an unconfigured block of the given type
    ///
    /// - "timer" -> TimerBlock
    /// - "dead_mans_switch" -> DeadMansSwitchBlock
    /// - "mux" / "splitter" / "split" -> fan-out blocks
    /// - "map" / "deduplicate" / "log" -> message bridges
    /// - "http_server" / "http_request" -> HTTP ingress and egress
    pub fn create_block(block_type: &str) -> Result<Box<dyn Block>, ConfigError> {
        registry()
            .iter()
            .find(|(name, _)| *name == block_type)
            .map(|(_, constructor)| constructor())
            .ok_or_else(|| ConfigError::UnknownBlockType {
                block_type: block_type.to_string(),
            })
    }

    /// List all available block types
    pub fn list_available_types() -> Vec<&'static str> {
        registry().iter().map(|(name, _)| *name).collect()
    }

    /// Check if a block type is available
    pub fn is_type_available(block_type: &str) -> bool {
        registry().iter().any(|(name, _)| *name == block_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_registered_type_reports_its_name() {
        for block_type in BlockFactory::list_available_types() {
            let block = BlockFactory::create_block(block_type).unwrap();
            assert_eq!(block.block_type(), block_type);
        }
    }

    #[test]
    fn test_create_block_unknown_type() {
        let result = BlockFactory::create_block("teleporter");
        assert!(matches!(
            result,
            Err(ConfigError::UnknownBlockType { ref block_type }) if block_type == "teleporter"
        ));
    }

    #[test]
    fn test_list_available_types() {
        let types = BlockFactory::list_available_types();
        assert_eq!(types.len(), 10);
        assert!(types.contains(&"dead_mans_switch"));
        assert!(BlockFactory::is_type_available("http_server"));
        assert!(!BlockFactory::is_type_available("grpc_server"));
    }
}
