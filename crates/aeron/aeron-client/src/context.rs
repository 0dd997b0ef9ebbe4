//! Process-wide context (spec.md §6 "Configuration options").
//!
//! `ContextToml` is the on-disk shape, loaded the way `ObsidianConfig` loads
//! `obsidian.toml`; `Context` is the resolved, ready-to-use value the
//! conductor is built from, carrying the injected clocks that have no TOML
//! representation.

use crate::clock::{EpochClock, NanoClock, SystemEpochClock, SystemNanoClock};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Deserialize, Debug)]
pub struct ContextToml {
    #[serde(default = "defaults::aeron_dir")]
    pub aeron_dir: String,
    #[serde(default = "defaults::driver_timeout_ms")]
    pub driver_timeout_ms: i64,
    #[serde(default = "defaults::client_liveness_timeout_ns")]
    pub client_liveness_timeout_ns: i64,
    #[serde(default = "defaults::keepalive_interval_ms")]
    pub keepalive_interval_ms: i64,
    #[serde(default = "defaults::use_conductor_agent_invoker")]
    pub use_conductor_agent_invoker: bool,
    #[serde(default = "defaults::resource_linger_duration_ns")]
    pub resource_linger_duration_ns: i64,
}

mod defaults {
    pub fn aeron_dir() -> String {
        std::env::temp_dir()
            .join("aeron")
            .to_string_lossy()
            .into_owned()
    }

    pub fn driver_timeout_ms() -> i64 {
        10_000
    }

    pub fn client_liveness_timeout_ns() -> i64 {
        5_000_000_000
    }

    pub fn keepalive_interval_ms() -> i64 {
        500
    }

    pub fn use_conductor_agent_invoker() -> bool {
        false
    }

    pub fn resource_linger_duration_ns() -> i64 {
        5_000_000_000
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read '{path}'")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config")]
    Parse(#[from] toml::de::Error),
}

impl ContextToml {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_string_lossy().into_owned(),
            source,
        })?;
        Ok(toml::from_str(&raw)?)
    }
}

/// Resolved configuration plus the injected clocks the conductor is built
/// from. Not `Deserialize` itself: clocks are supplied programmatically
/// (spec.md §9 "Clock injection"), never read from TOML.
pub struct Context {
    pub aeron_dir: PathBuf,
    pub driver_timeout_ms: i64,
    pub client_liveness_timeout_ns: i64,
    pub keepalive_interval_ms: i64,
    pub use_conductor_agent_invoker: bool,
    pub resource_linger_duration_ns: i64,
    pub epoch_clock: Arc<dyn EpochClock>,
    pub nano_clock: Arc<dyn NanoClock>,
}

impl Context {
    /// A `Context` with the default TOML values and real system clocks.
    pub fn new() -> Self {
        Self::from_toml(ContextToml {
            aeron_dir: defaults::aeron_dir(),
            driver_timeout_ms: defaults::driver_timeout_ms(),
            client_liveness_timeout_ns: defaults::client_liveness_timeout_ns(),
            keepalive_interval_ms: defaults::keepalive_interval_ms(),
            use_conductor_agent_invoker: defaults::use_conductor_agent_invoker(),
            resource_linger_duration_ns: defaults::resource_linger_duration_ns(),
        })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Ok(Self::from_toml(ContextToml::load(path)?))
    }

    fn from_toml(toml: ContextToml) -> Self {
        Self {
            aeron_dir: PathBuf::from(toml.aeron_dir),
            driver_timeout_ms: toml.driver_timeout_ms,
            client_liveness_timeout_ns: toml.client_liveness_timeout_ns,
            keepalive_interval_ms: toml.keepalive_interval_ms,
            use_conductor_agent_invoker: toml.use_conductor_agent_invoker,
            resource_linger_duration_ns: toml.resource_linger_duration_ns,
            epoch_clock: Arc::new(SystemEpochClock),
            nano_clock: Arc::new(SystemNanoClock),
        }
    }

    /// Overrides the injected clocks, for deterministic tests (P6, scenario
    /// 3).
    pub fn with_clocks(mut self, epoch_clock: Arc<dyn EpochClock>, nano_clock: Arc<dyn NanoClock>) -> Self {
        self.epoch_clock = epoch_clock;
        self.nano_clock = nano_clock;
        self
    }

    pub fn with_driver_timeout_ms(mut self, driver_timeout_ms: i64) -> Self {
        self.driver_timeout_ms = driver_timeout_ms;
        self
    }

    pub fn with_aeron_dir(mut self, aeron_dir: impl Into<PathBuf>) -> Self {
        self.aeron_dir = aeron_dir.into();
        self
    }

    pub fn cnc_path(&self) -> PathBuf {
        self.aeron_dir.join("cnc.dat")
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
