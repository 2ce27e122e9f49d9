//! Queue configuration
//!
//! Values are layered: built-in defaults, then an optional file (TOML, YAML
//! or JSON, picked by extension), then `RQ_*` environment variables
//! (`RQ_REDIS_URL`, `RQ_MAX_WORKERS`, ...). Command-line flags are applied on
//! top by the binary.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{QueueError, QueueResult};
use crate::keys::KeySpace;

pub const ENV_PREFIX: &str = "RQ";

/// Environment variable carrying the store URL, read by the env layer
pub const REDIS_URL_ENV: &str = "RQ_REDIS_URL";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Store connection URL
    pub redis_url: String,
    /// Key space prefix; empty for the default space
    pub namespace: String,
    /// Host name used for the Watch Set and master identity (env: HOSTNAME)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// Upper bound on concurrently live workers per host (at least 1)
    pub max_workers: usize,
    /// Jobs a worker executes before exiting; also the number of due
    /// timestamps one delay pass drains
    pub budget: u64,
    /// Identity TTL and blocking pop bound (half of it)
    pub scan_interval_ms: u64,
    /// Pause between master or worker loop iterations with nothing to do
    /// (greater than zero)
    pub idle_interval_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1:6379".to_string(),
            namespace: String::new(),
            host: std::env::var("HOSTNAME").ok().filter(|h| !h.is_empty()),
            max_workers: 10,
            budget: 200,
            scan_interval_ms: 60_000,
            idle_interval_ms: 3_000,
        }
    }
}

impl QueueConfig {
    /// Load defaults, an optional file, and `RQ_*` overrides.
    pub fn load(path: Option<&Path>) -> QueueResult<Self> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Self::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let loaded: Self = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize()?;

        loaded.validate()?;
        Ok(loaded)
    }

    /// Defaults plus `RQ_*` overrides, without a file
    pub fn from_env() -> QueueResult<Self> {
        Self::load(None)
    }

    pub fn validate(&self) -> QueueResult<()> {
        if self.budget == 0 {
            return Err(QueueError::Config("budget must be at least 1".to_string()));
        }
        if self.scan_interval_ms == 0 {
            return Err(QueueError::Config(
                "scan_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.idle_interval_ms == 0 {
            return Err(QueueError::Config(
                "idle_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.max_workers == 0 {
            return Err(QueueError::Config("max_workers must be at least 1".to_string()));
        }
        if self.redis_url.is_empty() {
            return Err(QueueError::Config("redis_url is empty".to_string()));
        }
        Ok(())
    }

    pub fn keys(&self) -> KeySpace {
        KeySpace::new(&self.namespace, self.host.clone())
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval_ms)
    }

    pub fn idle_interval(&self) -> Duration {
        Duration::from_millis(self.idle_interval_ms)
    }

    /// Blocking pop timeout: half the scan interval
    pub fn poll_timeout(&self) -> Duration {
        self.scan_interval() / 2
    }
}
