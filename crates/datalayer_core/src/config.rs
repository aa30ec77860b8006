//! Store and unit-of-work configuration.
//!
//! # Invariants
//! - Every field has a default, so an empty document deserializes to a
//!   usable in-memory configuration.

use crate::logging::{init_logging, LogConfig, LoggingError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Settings for opening the store and stamping audit columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Database file. `None` opens an in-memory database.
    pub database_path: Option<PathBuf>,
    pub busy_timeout_ms: u64,
    pub foreign_keys: bool,
    /// Name written to `created_by`/`last_modified_by`. `None` stamps a
    /// random identifier per unit of work.
    pub auditor: Option<String>,
    pub log: Option<LogConfig>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            foreign_keys: true,
            auditor: None,
            log: None,
        }
    }
}

impl StoreConfig {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn with_auditor(mut self, auditor: impl Into<String>) -> Self {
        self.auditor = Some(auditor.into());
        self
    }

    /// Starts logging from the `log` section. Without one, logging is left
    /// as it is.
    pub fn start_logging(&self) -> Result<(), LoggingError> {
        match &self.log {
            Some(log) => init_logging(log),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::StoreConfig;
    use crate::logging::{LogConfig, LoggingError};

    #[test]
    fn empty_document_yields_defaults() {
        let config: StoreConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, StoreConfig::default());
        assert!(config.foreign_keys);
        assert_eq!(config.busy_timeout_ms, 5_000);
        assert!(config.database_path.is_none());
    }

    #[test]
    fn partial_document_overrides_named_fields() {
        let config: StoreConfig =
            serde_json::from_str(r#"{"auditor":"batch","log":{"level":"warn"}}"#).unwrap();
        assert_eq!(config.auditor.as_deref(), Some("batch"));
        let log = config.log.unwrap();
        assert_eq!(log.level, "warn");
        assert!(log.directory.is_none());
    }

    #[test]
    fn start_logging_without_section_is_a_no_op() {
        assert!(StoreConfig::default().start_logging().is_ok());
    }

    #[test]
    fn start_logging_validates_the_section() {
        let config = StoreConfig {
            log: Some(LogConfig {
                level: "loud".to_string(),
                directory: None,
            }),
            ..StoreConfig::default()
        };
        assert!(matches!(
            config.start_logging(),
            Err(LoggingError::UnsupportedLevel(_))
        ));
    }
}
