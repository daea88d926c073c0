//! Configuration management for Turnstile.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{Result, TurnstileError};
use crate::ratelimit::RateLimitPolicy;

/// Prefix for environment variable overrides, e.g. `TURNSTILE__LIMITER__LIMIT`.
pub const ENV_PREFIX: &str = "TURNSTILE";

/// Main configuration for the Turnstile service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnstileConfig {
    /// Rate limiting configuration
    #[serde(default)]
    pub limiter: LimiterConfig,

    /// Background eviction configuration
    #[serde(default)]
    pub sweeper: SweeperConfig,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Maximum requests admitted per window
    #[serde(default = "default_limit")]
    pub limit: u64,

    /// Window length in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Idle period in seconds after which a record may be evicted
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            window_secs: default_window_secs(),
            idle_timeout_secs: default_idle_timeout_secs(),
        }
    }
}

fn default_limit() -> u64 {
    100
}

fn default_window_secs() -> u64 {
    60
}

fn default_idle_timeout_secs() -> u64 {
    300
}

impl LimiterConfig {
    /// Build the policy the limiter enforces.
    pub fn policy(&self) -> RateLimitPolicy {
        RateLimitPolicy::new(self.limit, Duration::from_secs(self.window_secs))
            .with_idle_timeout(Duration::from_secs(self.idle_timeout_secs))
    }
}

/// Background eviction configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweeperConfig {
    /// Whether the background sweeper runs at all
    #[serde(default = "default_sweeper_enabled")]
    pub enabled: bool,

    /// Seconds between sweeps
    #[serde(default = "default_sweep_interval_secs")]
    pub interval_secs: u64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            enabled: default_sweeper_enabled(),
            interval_secs: default_sweep_interval_secs(),
        }
    }
}

fn default_sweeper_enabled() -> bool {
    true
}

fn default_sweep_interval_secs() -> u64 {
    30
}

impl SweeperConfig {
    /// Time between sweeps.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl TurnstileConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: TurnstileConfig = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Load configuration from an optional file, then apply
    /// `TURNSTILE__*` environment overrides.
    ///
    /// `TURNSTILE__LIMITER__WINDOW_SECS=10` sets `limiter.window_secs`.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            info!(path = %path, "Loading configuration");
            builder = builder.add_source(config::File::with_name(path));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize::<TurnstileConfig>()?)
    }

    /// Check values that the limiter itself does not validate.
    pub fn validate(&self) -> Result<()> {
        self.limiter.policy().validate()?;
        if self.sweeper.enabled && self.sweeper.interval_secs == 0 {
            return Err(TurnstileError::InvalidConfiguration(
                "sweep interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
