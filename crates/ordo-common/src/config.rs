//! Lock configuration
//!
//! Settings are read from an optional file plus `ORDO_`-prefixed environment
//! variables, e.g. `ORDO_LOCK__LOCK_NAME=job-`.

use std::path::Path;

use anyhow::{Context, bail};
use config::{Config, ConfigError, Environment};
use serde::Deserialize;
use tracing::debug;

pub const DEFAULT_LOCK_NAME: &str = "lock-";
pub const DEFAULT_NODE_LOSS_RETRIES: u32 = 3;

/// Configuration section key
const LOCK_SECTION: &str = "lock";

/// Tunables for a mutex instance
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Node-name prefix of contender nodes (default: `lock-`)
    pub lock_name: String,

    /// How many times a pending acquisition re-creates its node after the
    /// node vanished (session expiry) before giving up
    pub node_loss_retries: u32,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            lock_name: DEFAULT_LOCK_NAME.to_string(),
            node_loss_retries: DEFAULT_NODE_LOSS_RETRIES,
        }
    }
}

impl LockConfig {
    /// Load from an optional config file and the environment
    pub fn load(file: Option<&Path>) -> anyhow::Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(
            Environment::with_prefix("ordo")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let settings = builder
            .build()
            .context("failed to build lock configuration")?;
        let lock_config = Self::from_config(&settings)?;
        debug!(
            lock_name = %lock_config.lock_name,
            node_loss_retries = lock_config.node_loss_retries,
            "Loaded lock configuration"
        );
        Ok(lock_config)
    }

    /// Extract the `[lock]` section, falling back to defaults when absent
    pub fn from_config(settings: &Config) -> anyhow::Result<Self> {
        let lock_config = match settings.get::<LockConfig>(LOCK_SECTION) {
            Ok(lock_config) => lock_config,
            Err(ConfigError::NotFound(_)) => LockConfig::default(),
            Err(e) => return Err(e).context("invalid [lock] configuration section"),
        };
        lock_config.validate()?;
        Ok(lock_config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.lock_name.is_empty() {
            bail!("lock.lock_name must not be empty");
        }
        if self.lock_name.contains('/') {
            bail!(
                "lock.lock_name '{}' must not contain a path separator",
                self.lock_name
            );
        }
        Ok(())
    }

    pub fn with_lock_name(mut self, lock_name: impl Into<String>) -> Self {
        self.lock_name = lock_name.into();
        self
    }

    pub fn with_node_loss_retries(mut self, retries: u32) -> Self {
        self.node_loss_retries = retries;
        self
    }
}
