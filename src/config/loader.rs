// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::comm::Value;
use crate::errors::{ConfigError, GraphError};

/// Top-level configuration: the block graph plus extra default variables.
///
/// # Example
/// ```yaml
/// variables:
///   site: lab
/// blocks:
///   - type: dead_mans_switch
///     id: heartbeat
///     timeout: 5m
///     send_to: [notify]
///   - type: http_request
///     id: notify
///     method: POST
///     url: "https://alerts.example.com/${site}"
///     body: { event: "${msg.event}" }
/// ```
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Merged into the default variables visible to every expression
    #[serde(default)]
    pub variables: HashMap<String, Value>,
    pub blocks: Vec<BlockConfig>,
}

/// One block: its type, an optional identifier and the type's own settings.
#[derive(Debug, Clone, Deserialize)]
pub struct BlockConfig {
    #[serde(rename = "type")]
    pub block_type: String,
    pub id: Option<String>,
    #[serde(flatten)]
    pub settings: serde_yaml::Mapping,
}

impl BlockConfig {
    /// The configured id, or `<type>_<index>` when none was given.
    pub fn id_or_default(&self, index: usize) -> String {
        self.id
            .clone()
            .unwrap_or_else(|| format!("{}_{}", self.block_type, index))
    }

    /// Settings as handed to `Block::configure`.
    pub fn settings_value(&self) -> serde_yaml::Value {
        serde_yaml::Value::Mapping(self.settings.clone())
    }
}

/// Load a config from a YAML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
        block_id: None,
        source,
    })
}

/// Load a config and run the structural checks that do not need blocks to
/// be built.
pub fn load_and_validate_config<P: AsRef<Path>>(path: P) -> Result<Config, GraphError> {
    let cfg = load_config(path)?;
    crate::config::validate_config(&cfg).map_err(|errors| GraphError { errors })?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn parse_basic_config() {
        let yaml = r#"
variables:
  site: lab
  retries: 3
blocks:
  - type: timer
    id: watchdog
    timeout: 10s
    on_timeout: alert
  - type: log
"#;

        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.variables["site"], json!("lab"));
        assert_eq!(cfg.variables["retries"], json!(3));
        assert_eq!(cfg.blocks.len(), 2);
        assert_eq!(cfg.blocks[0].block_type, "timer");
        assert_eq!(cfg.blocks[0].id_or_default(0), "watchdog");
        assert_eq!(cfg.blocks[1].id_or_default(1), "log_1");

        let settings = cfg.blocks[0].settings_value();
        assert_eq!(settings["timeout"], serde_yaml::Value::from("10s"));
        assert!(settings.get("type").is_none());
        assert!(settings.get("id").is_none());
    }

    #[test]
    fn test_block_without_settings() {
        let cfg: Config = serde_yaml::from_str("blocks:\n  - type: log\n").unwrap();
        assert!(cfg.blocks[0].settings.is_empty());
        assert!(cfg.variables.is_empty());
    }

    #[test]
    fn test_unknown_top_level_key_is_rejected() {
        let result: Result<Config, _> = serde_yaml::from_str("blocks: []\nstrategy: fast\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_errors() {
        assert!(matches!(
            load_config("/nonexistent/deadmanswitch.yaml"),
            Err(ConfigError::Io { .. })
        ));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "blocks: {{ not: a list }}").unwrap();
        assert!(matches!(
            load_config(file.path()),
            Err(ConfigError::Parse { block_id: None, .. })
        ));
    }

    #[test]
    fn test_load_and_validate_reports_every_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
blocks:
  - type: teleporter
  - type: log
    id: msg
  - type: log
    id: out
  - type: log
    id: out
"#
        )
        .unwrap();

        let errors = load_and_validate_config(file.path()).unwrap_err().errors;
        assert_eq!(errors.len(), 3);
    }
}
