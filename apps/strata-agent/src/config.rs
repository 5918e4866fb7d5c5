//! # Agent Configuration
//!
//! ## Load Order (later overrides earlier)
//! 1. Default values
//! 2. Config file (`strata.toml` in the platform config dir, or `STRATA_CONFIG`)
//! 3. Environment variables
//!
//! ## Example `strata.toml`
//! ```toml
//! bus_capacity = 256
//! writer_buffer = 65536
//! client_id = "strata-front"
//! system_identity = "system"
//!
//! [[targets]]
//! id = "docs"
//! left = "fs:///home/me/Documents"
//! right = "router:///personal/docs"
//! ```

use std::collections::HashSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use strata_control::BusConfig;
use strata_core::{Identity, DEFAULT_CLIENT_ID, SYSTEM_IDENTITY};
use strata_endpoint::{FactorySettings, DEFAULT_WRITER_BUFFER};
use tracing::{debug, info, warn};

use crate::error::{AgentError, AgentResult};

pub const CONFIG_ENV: &str = "STRATA_CONFIG";
const CONFIG_FILE: &str = "strata.toml";

/// One pair of endpoints kept in sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Addresses the target on the bus (`sync-<id>`).
    pub id: String,

    /// URI of the source side.
    pub left: String,

    /// URI of the destination side.
    pub right: String,

    /// Resolve the source side browse-only.
    #[serde(default)]
    pub browse_only: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub bus_capacity: usize,
    pub writer_buffer: usize,
    pub client_id: String,
    pub system_identity: String,
    pub targets: Vec<TargetConfig>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        AgentConfig {
            bus_capacity: strata_control::DEFAULT_BUS_CAPACITY,
            writer_buffer: DEFAULT_WRITER_BUFFER,
            client_id: DEFAULT_CLIENT_ID.to_string(),
            system_identity: SYSTEM_IDENTITY.to_string(),
            targets: vec![TargetConfig {
                id: "demo".to_string(),
                left: "db://".to_string(),
                right: "router:///demo".to_string(),
                browse_only: false,
            }],
        }
    }
}

impl AgentConfig {
    /// Loads configuration from file, environment, and defaults.
    pub fn load(config_path: Option<PathBuf>) -> AgentResult<Self> {
        let path = config_path
            .or_else(|| std::env::var(CONFIG_ENV).ok().map(PathBuf::from))
            .or_else(Self::default_config_path);

        let mut config = match path {
            Some(path) if path.exists() => {
                info!(?path, "Loading agent config from file");
                Self::from_toml(&std::fs::read_to_string(&path)?)?
            }
            Some(path) => {
                debug!(?path, "Config file not found, using defaults");
                Self::default()
            }
            None => Self::default(),
        };

        config.apply_env_overrides(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> AgentResult<Self> {
        Ok(toml::from_str(contents)?)
    }

    pub fn validate(&self) -> AgentResult<()> {
        if self.bus_capacity == 0 {
            return Err(AgentError::InvalidConfig(
                "bus_capacity must be greater than 0".into(),
            ));
        }
        if self.writer_buffer == 0 {
            return Err(AgentError::InvalidConfig(
                "writer_buffer must be greater than 0".into(),
            ));
        }
        if self.system_identity.is_empty() {
            return Err(AgentError::InvalidConfig(
                "system_identity must not be empty".into(),
            ));
        }

        let mut seen = HashSet::new();
        for target in &self.targets {
            if target.id.is_empty() || target.id.chars().any(char::is_whitespace) {
                return Err(AgentError::InvalidConfig(format!(
                    "target id {:?} must be a non-empty word",
                    target.id
                )));
            }
            if !seen.insert(target.id.as_str()) {
                return Err(AgentError::InvalidConfig(format!(
                    "duplicate target id {:?}",
                    target.id
                )));
            }
            for uri in [&target.left, &target.right] {
                url::Url::parse(uri).map_err(|e| {
                    AgentError::InvalidConfig(format!(
                        "target {:?}: invalid uri {:?}: {}",
                        target.id, uri, e
                    ))
                })?;
            }
        }
        Ok(())
    }

    /// Applies `STRATA_*` overrides read through `lookup`.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(raw) = lookup("STRATA_BUS_CAPACITY") {
            match raw.parse() {
                Ok(capacity) => {
                    debug!(capacity, "Overriding bus capacity from environment");
                    self.bus_capacity = capacity;
                }
                Err(_) => warn!(value = %raw, "Ignoring invalid STRATA_BUS_CAPACITY"),
            }
        }
        if let Some(raw) = lookup("STRATA_WRITER_BUFFER") {
            match raw.parse() {
                Ok(buffer) => {
                    debug!(buffer, "Overriding writer buffer from environment");
                    self.writer_buffer = buffer;
                }
                Err(_) => warn!(value = %raw, "Ignoring invalid STRATA_WRITER_BUFFER"),
            }
        }
        if let Some(id) = lookup("STRATA_CLIENT_ID") {
            self.client_id = id;
        }
        if let Some(identity) = lookup("STRATA_SYSTEM_IDENTITY") {
            self.system_identity = identity;
        }
    }

    pub fn bus_config(&self) -> BusConfig {
        BusConfig {
            capacity: self.bus_capacity,
        }
    }

    pub fn factory_settings(&self) -> FactorySettings {
        FactorySettings {
            writer_buffer: self.writer_buffer,
            default_client_id: self.client_id.clone(),
            system_identity: Identity::user(self.system_identity.clone()),
        }
    }

    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("io", "strata", "strata")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE))
    }
}
