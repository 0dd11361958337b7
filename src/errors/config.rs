// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::fmt;

/// Errors detected while loading the configuration or building the block
/// graph. All of them are fatal at startup.
#[derive(Debug)]
pub enum ConfigError {
    /// The configuration file could not be read
    Io {
        path: String,
        source: std::io::Error,
    },
    /// The configuration file (or a block body) is not valid YAML for its schema
    Parse {
        /// Block id, or `None` for the top-level document
        block_id: Option<String>,
        source: serde_yaml::Error,
    },
    /// No factory is registered for a block type
    UnknownBlockType { block_type: String },
    /// Two blocks share the same identifier
    DuplicateBlockId { block_id: String },
    /// A block identifier collides with a built-in variable name
    ReservedIdentifier { block_id: String },
    /// A configured variable would shadow a built-in one
    ReservedVariable { name: String },
    /// The configuration declares no blocks at all
    EmptyGraph,
    /// A block references a block id that does not exist
    UnknownBlockReference { block_id: String, reference: String },
    /// A block references a block that has no input channel
    NotAddressable { block_id: String, reference: String },
    /// A duration literal could not be parsed
    InvalidDuration {
        block_id: String,
        field: &'static str,
        value: String,
        reason: String,
    },
    /// A setting holds a value outside of what the block supports
    InvalidSetting {
        block_id: String,
        field: &'static str,
        reason: String,
    },
    /// A block was started before being bound or configured
    NotConfigured { block_id: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "Failed to read configuration '{}': {}", path, source)
            }
            ConfigError::Parse {
                block_id: Some(block_id),
                source,
            } => write!(f, "Invalid settings for block '{}': {}", block_id, source),
            ConfigError::Parse {
                block_id: None,
                source,
            } => write!(f, "Invalid configuration: {}", source),
            ConfigError::UnknownBlockType { block_type } => {
                write!(f, "Unknown block type: '{}'", block_type)
            }
            ConfigError::DuplicateBlockId { block_id } => {
                write!(f, "Duplicate block identifier: '{}'", block_id)
            }
            ConfigError::ReservedIdentifier { block_id } => {
                write!(f, "Reserved variable name used as block identifier: '{}'", block_id)
            }
            ConfigError::ReservedVariable { name } => {
                write!(f, "Variable '{}' cannot be redefined", name)
            }
            ConfigError::EmptyGraph => write!(f, "Configuration declares no blocks"),
            ConfigError::UnknownBlockReference {
                block_id,
                reference,
            } => write!(
                f,
                "Block '{}' sends to '{}' which does not exist",
                block_id, reference
            ),
            ConfigError::NotAddressable {
                block_id,
                reference,
            } => write!(
                f,
                "Block '{}' sends to '{}' which does not accept messages",
                block_id, reference
            ),
            ConfigError::InvalidDuration {
                block_id,
                field,
                value,
                reason,
            } => write!(
                f,
                "Block '{}' has an invalid duration '{}' in '{}': {}",
                block_id, value, field, reason
            ),
            ConfigError::InvalidSetting {
                block_id,
                field,
                reason,
            } => write!(f, "Block '{}' has an invalid '{}': {}", block_id, field, reason),
            ConfigError::NotConfigured { block_id } => {
                write!(f, "Block '{}' was started before it was configured", block_id)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Every configuration error found while building a graph.
#[derive(Debug)]
pub struct GraphError {
    pub errors: Vec<ConfigError>,
}

impl From<ConfigError> for GraphError {
    fn from(error: ConfigError) -> Self {
        Self {
            errors: vec![error],
        }
    }
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Configuration validation failed:")?;
        for error in &self.errors {
            write!(f, "\n{}", error)?;
        }
        Ok(())
    }
}

impl std::error::Error for GraphError {}
