// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Structural checks on a loaded configuration.
//!
//! These run before any block is built and accumulate every problem found,
//! so a broken file is reported in one go:
//!
//! 1. there is at least one block
//! 2. configured variables must not redefine `msg` or `env`
//! 3. every block type must be registered
//! 4. block ids must be unique and must not be `msg` or `env`
//!
//! Settings and block references are checked later, while building the
//! graph, because they need the blocks themselves.

use std::collections::HashSet;

use crate::blocks::BlockFactory;
use crate::config::Config;
use crate::errors::ConfigError;
use crate::expr::{ENV_VARIABLE, MSG_VARIABLE};

const RESERVED: [&str; 2] = [MSG_VARIABLE, ENV_VARIABLE];

pub fn validate_config(config: &Config) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    if config.blocks.is_empty() {
        errors.push(ConfigError::EmptyGraph);
    }

    let mut variables: Vec<&String> = config
        .variables
        .keys()
        .filter(|name| RESERVED.contains(&name.as_str()))
        .collect();
    variables.sort();
    errors.extend(variables.into_iter().map(|name| ConfigError::ReservedVariable {
        name: name.clone(),
    }));

    let mut seen = HashSet::new();
    for (index, block) in config.blocks.iter().enumerate() {
        if !BlockFactory::is_type_available(&block.block_type) {
            errors.push(ConfigError::UnknownBlockType {
                block_type: block.block_type.clone(),
            });
        }

        let block_id = block.id_or_default(index);
        if RESERVED.contains(&block_id.as_str()) {
            errors.push(ConfigError::ReservedIdentifier { block_id });
        } else if !seen.insert(block_id.clone()) {
            errors.push(ConfigError::DuplicateBlockId { block_id });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validate(yaml: &str) -> Result<(), Vec<ConfigError>> {
        validate_config(&serde_yaml::from_str(yaml).unwrap())
    }

    #[test]
    fn test_valid_config() {
        assert!(validate(
            r#"
variables: { site: lab }
blocks:
  - type: timer
    id: watchdog
  - type: log
  - type: log
"#
        )
        .is_ok());
    }

    #[test]
    fn test_empty_graph_is_rejected() {
        let errors = validate("variables: { site: lab }\nblocks: []\n").unwrap_err();
        assert!(matches!(errors.as_slice(), [ConfigError::EmptyGraph]));
    }

    #[test]
    fn test_duplicate_ids_including_defaults() {
        let errors = validate(
            r#"
blocks:
  - type: log
  - type: log
    id: log_0
"#,
        )
        .unwrap_err();
        assert!(matches!(
            errors.as_slice(),
            [ConfigError::DuplicateBlockId { block_id }] if block_id == "log_0"
        ));
    }

    #[test]
    fn test_reserved_names() {
        let errors = validate(
            r#"
variables: { env: {}, msg: 1, site: lab }
blocks:
  - type: log
    id: env
"#,
        )
        .unwrap_err();
        assert!(matches!(
            errors.as_slice(),
            [
                ConfigError::ReservedVariable { name: first },
                ConfigError::ReservedVariable { name: second },
                ConfigError::ReservedIdentifier { block_id },
            ] if first == "env" && second == "msg" && block_id == "env"
        ));
    }

    #[test]
    fn test_unknown_types_are_all_reported() {
        let errors = validate(
            r#"
blocks:
  - type: teleporter
  - type: log
  - type: flux_capacitor
"#,
        )
        .unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors
            .iter()
            .all(|e| matches!(e, ConfigError::UnknownBlockType { .. })));
    }
}
