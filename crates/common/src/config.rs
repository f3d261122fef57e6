use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{FedqError, Result};

/// Which executor answers `Engine::sql`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyMode {
    /// Strategy Selector decides between Fast-Path and Generic.
    #[default]
    Auto,
    /// Always walk the logical plan operator-by-operator.
    Generic,
    /// Interpret the parsed query with the legacy executor.
    Legacy,
}

impl StrategyMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Generic => "generic",
            Self::Legacy => "legacy",
        }
    }
}

impl fmt::Display for StrategyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyMode {
    type Err = FedqError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "generic" => Ok(Self::Generic),
            "legacy" => Ok(Self::Legacy),
            other => Err(FedqError::InvalidConfig(format!(
                "unknown strategy '{other}' (expected auto|generic|legacy)"
            ))),
        }
    }
}

/// Connection settings for one source, handed to the connector constructor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Source name tables are bound to in the catalog.
    pub name: String,
    pub uri: String,
    pub database: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl SourceConfig {
    pub fn new(name: impl Into<String>, uri: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uri: uri.into(),
            database: database.into(),
            user: None,
            password: None,
        }
    }

    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.password = Some(password.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub strategy: StrategyMode,
    /// Issue the two independent per-source calls of one execution concurrently.
    #[serde(default = "default_concurrent_fanout")]
    pub concurrent_fanout: bool,
    #[serde(default = "default_relational_source")]
    pub relational: SourceConfig,
    #[serde(default = "default_document_source")]
    pub document: SourceConfig,
}

fn default_concurrent_fanout() -> bool {
    true
}

fn default_relational_source() -> SourceConfig {
    SourceConfig::new("relational", "memory://relational", "federated")
}

fn default_document_source() -> SourceConfig {
    SourceConfig::new("document", "memory://document", "federated")
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyMode::Auto,
            concurrent_fanout: default_concurrent_fanout(),
            relational: default_relational_source(),
            document: default_document_source(),
        }
    }
}

impl EngineConfig {
    /// Load a config from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: &str) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw)
            .map_err(|e| FedqError::InvalidConfig(format!("config '{path}': {e}")))
    }

    /// Apply `FEDQ_STRATEGY` / `FEDQ_CONCURRENT_FANOUT` when set.
    pub fn apply_env_overrides(mut self) -> Result<Self> {
        if let Ok(v) = std::env::var("FEDQ_STRATEGY") {
            self.strategy = v.parse()?;
        }
        if let Ok(v) = std::env::var("FEDQ_CONCURRENT_FANOUT") {
            self.concurrent_fanout = parse_bool_flag("FEDQ_CONCURRENT_FANOUT", &v)?;
        }
        Ok(self)
    }
}

fn parse_bool_flag(name: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(FedqError::InvalidConfig(format!(
            "{name} must be a boolean, got '{other}'"
        ))),
    }
}
