// SPDX-License-Identifier: Apache-2.0

//! Configuration Loader
//!
//! Handle policy as a JSON document:
//!
//! ```json
//! {
//!   "allow_dropping": false,
//!   "check_delete_statements": true,
//!   "error_catching": false,
//!   "error_logging": false,
//!   "banned_statements": ["UPDATE"],
//!   "banned_syntax": ["sqlite_master"],
//!   "default_query_logger": false,
//!   "default_row_factory": true
//! }
//! ```
//!
//! Every field is required and unknown fields are rejected.

use std::path::Path;
use std::str::FromStr;

use guard_core::{ErrorMode, GuardError, GuardResult, RowFactory, StatementKind};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GuardConfig {
    pub allow_dropping: bool,
    pub check_delete_statements: bool,
    pub error_catching: bool,
    pub error_logging: bool,
    #[serde(deserialize_with = "statement_kinds")]
    pub banned_statements: Vec<StatementKind>,
    pub banned_syntax: Vec<String>,
    /// Log every forwarded statement
    pub default_query_logger: bool,
    /// `true` for rows readable by column name, `false` for plain tuples
    pub default_row_factory: bool,
}

/// Statement kinds are matched case-insensitively
fn statement_kinds<'de, D>(deserializer: D) -> Result<Vec<StatementKind>, D::Error>
where
    D: Deserializer<'de>,
{
    let names: Vec<String> = Vec::deserialize(deserializer)?;
    names
        .iter()
        .map(|name| StatementKind::from_str(name).map_err(serde::de::Error::custom))
        .collect()
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            allow_dropping: false,
            check_delete_statements: true,
            error_catching: false,
            error_logging: false,
            banned_statements: Vec::new(),
            banned_syntax: Vec::new(),
            default_query_logger: false,
            default_row_factory: false,
        }
    }
}

impl GuardConfig {
    pub fn from_json_str(json: &str) -> GuardResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| GuardError::config(format!("Failed to parse config: {}", e)))
    }

    pub async fn from_path(path: impl AsRef<Path>) -> GuardResult<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            GuardError::config(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        let config = Self::from_json_str(&content)?;
        info!("Loaded guard configuration from {:?}", path);
        Ok(config)
    }

    pub async fn save(&self, path: impl AsRef<Path>) -> GuardResult<()> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| GuardError::config(format!("Failed to serialize config: {}", e)))?;
        tokio::fs::write(path, content)
            .await
            .map_err(|e| GuardError::io(format!("Failed to write config: {}", e)))?;
        debug!("Saved guard configuration to {:?}", path);
        Ok(())
    }

    pub fn error_mode(&self) -> ErrorMode {
        ErrorMode::from_flags(self.error_catching, self.error_logging)
    }

    pub fn row_factory(&self) -> RowFactory {
        if self.default_row_factory {
            RowFactory::Named
        } else {
            RowFactory::Tuple
        }
    }
}

/// Where a configuration is imported from
#[derive(Debug, Clone, Copy)]
pub enum ConfigSource<'a> {
    Path(&'a Path),
    Json(&'a str),
}

impl ConfigSource<'_> {
    pub async fn load(self) -> GuardResult<GuardConfig> {
        match self {
            Self::Path(path) => GuardConfig::from_path(path).await,
            Self::Json(json) => GuardConfig::from_json_str(json),
        }
    }
}
