//! Environment detection.
//!
//! The host is probed once per process. The result is a plain
//! [`EnvironmentMode`] value that callers thread into history and store
//! construction, so no component re-checks the host on its own.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// Variable that forces the detected host (`server` or `browser`).
pub const HOST_VAR: &str = "ISOSTATE_HOST";

/// Variable carrying the build mode (`production` or `development`).
pub const PROFILE_VAR: &str = "ISOSTATE_ENV";

/// Where the process is executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentMode {
    /// Server-side rendering process, no browser globals reachable
    Server,
    /// Browser context with a live window and document
    Browser,
}

impl EnvironmentMode {
    /// Resolve the mode from probed host signals.
    ///
    /// Total and side-effect free: a host is a browser only when both the
    /// window object and its document factory are reachable.
    #[must_use]
    pub const fn detect(signals: HostSignals) -> Self {
        if signals.window && signals.document_factory {
            Self::Browser
        } else {
            Self::Server
        }
    }

    /// The mode of the current process.
    ///
    /// Probed on first call and cached for the lifetime of the process.
    #[must_use]
    pub fn current() -> Self {
        static MODE: OnceLock<EnvironmentMode> = OnceLock::new();
        *MODE.get_or_init(|| {
            let mode = Self::detect(HostSignals::probe());
            tracing::debug!(mode = %mode, "Resolved environment mode");
            mode
        })
    }

    /// Check if this is the server mode
    #[must_use]
    pub const fn is_server(self) -> bool {
        matches!(self, Self::Server)
    }

    /// Check if this is the browser mode
    #[must_use]
    pub const fn is_browser(self) -> bool {
        matches!(self, Self::Browser)
    }
}

impl fmt::Display for EnvironmentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Server => write!(f, "server"),
            Self::Browser => write!(f, "browser"),
        }
    }
}

impl FromStr for EnvironmentMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "server" => Ok(Self::Server),
            "browser" => Ok(Self::Browser),
            other => Err(format!("unknown environment mode: {other}")),
        }
    }
}

/// Presence of the browser globals the detector looks for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HostSignals {
    /// A window-like global object is reachable
    pub window: bool,
    /// The window exposes a document with element creation
    pub document_factory: bool,
}

impl HostSignals {
    /// Signals of a host with no browser globals.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            window: false,
            document_factory: false,
        }
    }

    /// Signals of a host with a full browser environment.
    #[must_use]
    pub const fn browser() -> Self {
        Self {
            window: true,
            document_factory: true,
        }
    }

    /// Probe the running process.
    ///
    /// wasm32 targets are treated as browser hosts. Native processes have no
    /// browser globals unless [`HOST_VAR`] says otherwise.
    #[must_use]
    pub fn probe() -> Self {
        match std::env::var(HOST_VAR).ok().map(|v| v.parse::<EnvironmentMode>()) {
            Some(Ok(EnvironmentMode::Browser)) => return Self::browser(),
            Some(Ok(EnvironmentMode::Server)) => return Self::none(),
            Some(Err(error)) => tracing::warn!(%error, "Ignoring {HOST_VAR}"),
            None => {},
        }

        if cfg!(target_arch = "wasm32") {
            Self::browser()
        } else {
            Self::none()
        }
    }
}

/// Build configuration the process runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildProfile {
    /// Optimized build; development tooling must stay disconnected
    Production,
    /// Development build with introspection and live reload allowed
    Development,
}

impl BuildProfile {
    /// Read the profile from [`PROFILE_VAR`], falling back to the compile
    /// profile (`debug_assertions`) when unset or unparsable.
    #[must_use]
    pub fn current() -> Self {
        match std::env::var(PROFILE_VAR).ok().map(|v| v.parse::<Self>()) {
            Some(Ok(profile)) => profile,
            Some(Err(error)) => {
                tracing::warn!(%error, "Ignoring {PROFILE_VAR}");
                Self::from_compile_profile()
            },
            None => Self::from_compile_profile(),
        }
    }

    const fn from_compile_profile() -> Self {
        if cfg!(debug_assertions) {
            Self::Development
        } else {
            Self::Production
        }
    }

    /// Check if this is a production build
    #[must_use]
    pub const fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }
}

impl Default for BuildProfile {
    fn default() -> Self {
        Self::from_compile_profile()
    }
}

impl fmt::Display for BuildProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Production => write!(f, "production"),
            Self::Development => write!(f, "development"),
        }
    }
}

impl FromStr for BuildProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(Self::Production),
            "development" | "dev" | "test" => Ok(Self::Development),
            other => Err(format!("unknown build profile: {other}")),
        }
    }
}
