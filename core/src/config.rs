//! Store configuration.
//!
//! Loads configuration from environment variables with sensible defaults.

use crate::environment::{BuildProfile, EnvironmentMode, HOST_VAR, PROFILE_VAR};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Variable overriding the default initial path.
pub const DEFAULT_PATH_VAR: &str = "ISOSTATE_DEFAULT_PATH";

/// Variable overriding the settle timeout, in milliseconds.
pub const SETTLE_TIMEOUT_VAR: &str = "ISOSTATE_SETTLE_TIMEOUT_MS";

/// Configuration for store assembly.
///
/// # Example
///
/// ```
/// use isostate_core::{BuildProfile, EnvironmentMode, StoreConfig};
/// use std::time::Duration;
///
/// let config = StoreConfig::default()
///     .with_profile(BuildProfile::Production)
///     .with_host_override(EnvironmentMode::Server)
///     .with_settle_timeout(Duration::from_secs(2));
///
/// assert_eq!(config.environment_mode(), EnvironmentMode::Server);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Build profile (production disables devtools and hot reload)
    pub profile: BuildProfile,
    /// Forces the environment mode instead of probing the host
    pub host_override: Option<EnvironmentMode>,
    /// Path used when a caller does not supply one
    pub default_path: String,
    /// Default bound for server-side waits on the root task
    pub settle_timeout: Duration,
}

impl StoreConfig {
    /// Load configuration from environment variables.
    ///
    /// Missing variables fall back to defaults. Unparsable values are
    /// logged and ignored.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self {
            profile: BuildProfile::current(),
            ..Self::default()
        };

        if let Ok(raw) = env::var(HOST_VAR) {
            match raw.parse::<EnvironmentMode>() {
                Ok(mode) => config.host_override = Some(mode),
                Err(error) => tracing::warn!(%error, "Ignoring {HOST_VAR}"),
            }
        }

        if let Ok(path) = env::var(DEFAULT_PATH_VAR) {
            if !path.trim().is_empty() {
                config.default_path = path;
            }
        }

        if let Ok(raw) = env::var(SETTLE_TIMEOUT_VAR) {
            match raw.parse::<u64>() {
                Ok(ms) => config.settle_timeout = Duration::from_millis(ms),
                Err(error) => tracing::warn!(%error, value = %raw, "Ignoring {SETTLE_TIMEOUT_VAR}"),
            }
        }

        tracing::debug!(
            profile = %config.profile,
            host_override = ?config.host_override,
            "Loaded store configuration ({PROFILE_VAR})"
        );

        config
    }

    /// Set the build profile
    #[must_use]
    pub const fn with_profile(mut self, profile: BuildProfile) -> Self {
        self.profile = profile;
        self
    }

    /// Force the environment mode
    #[must_use]
    pub const fn with_host_override(mut self, mode: EnvironmentMode) -> Self {
        self.host_override = Some(mode);
        self
    }

    /// Set the default initial path
    #[must_use]
    pub fn with_default_path(mut self, path: impl Into<String>) -> Self {
        self.default_path = path.into();
        self
    }

    /// Set the settle timeout
    #[must_use]
    pub const fn with_settle_timeout(mut self, timeout: Duration) -> Self {
        self.settle_timeout = timeout;
        self
    }

    /// The mode stores should be built for.
    ///
    /// The override wins; otherwise the process-wide cached detection is used.
    #[must_use]
    pub fn environment_mode(&self) -> EnvironmentMode {
        self.host_override.unwrap_or_else(EnvironmentMode::current)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            profile: BuildProfile::default(),
            host_override: None,
            default_path: "/".to_string(),
            settle_timeout: Duration::from_secs(10),
        }
    }
}
