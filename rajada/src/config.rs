//! Declarative simulation settings.
//!
//! Everything a run needs that is not code: where the target lives, how traffic is
//! shaped and how long requests may take. Settings load from a JSON file, then
//! environment variables override the protocol section.
//!
//! ```json
//! {
//!   "protocol": { "base_url": "http://localhost:9999", "user_agent": "Mozilla/5.0" },
//!   "profile": [
//!     { "kind": "constant", "rate": 2.0, "duration_ms": 10000 },
//!     { "kind": "ramp", "to": 600.0, "duration_ms": 180000 }
//!   ],
//!   "max_in_flight": 5000
//! }
//! ```
use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    error::ConfigError,
    profile::{Phase, Profile},
};

pub const BASE_URL_ENV: &str = "RAJADA_BASE_URL";
pub const USER_AGENT_ENV: &str = "RAJADA_USER_AGENT";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    pub base_url: String,
    pub user_agent: String,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_owned(),
            user_agent: "Mozilla/5.0".to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub protocol: ProtocolConfig,
    pub profile: Profile,
    #[serde(rename = "request_timeout_ms", with = "millis")]
    pub request_timeout: Duration,
    #[serde(rename = "pause_min_ms", with = "millis")]
    pub pause_min: Duration,
    #[serde(rename = "pause_max_ms", with = "millis")]
    pub pause_max: Duration,
    /// Ceiling on concurrently running executions; arrivals beyond it queue.
    pub max_in_flight: Option<usize>,
    /// Stop dispatching new executions after this many milliseconds.
    pub max_duration_ms: Option<u64>,
    /// How late the dispatcher may be before it counts schedule skew.
    #[serde(rename = "skew_tolerance_ms", with = "millis")]
    pub skew_tolerance: Duration,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            protocol: ProtocolConfig::default(),
            profile: default_profile(),
            request_timeout: Duration::from_millis(2_000),
            pause_min: Duration::from_millis(1),
            pause_max: Duration::from_millis(30),
            max_in_flight: None,
            max_duration_ms: None,
            skew_tolerance: Duration::from_millis(100),
        }
    }
}

/// 2/s for 10s, 5/s for 15s with jitter, then a ramp to 600/s over 3 minutes.
pub fn default_profile() -> Profile {
    Profile::new(vec![
        Phase::constant(2.0, Duration::from_secs(10)),
        Phase::constant(5.0, Duration::from_secs(15)).randomized(),
        Phase::ramp(600.0, Duration::from_secs(180)),
    ])
    .unwrap_or_default()
}

impl SimulationConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Overrides protocol settings from `RAJADA_BASE_URL` and `RAJADA_USER_AGENT`.
    pub fn apply_env(mut self) -> Self {
        self.apply_overrides(|key| std::env::var(key).ok());
        self
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(base_url) = lookup(BASE_URL_ENV) {
            tracing::info!("Base URL overridden by {BASE_URL_ENV}: {base_url}");
            self.protocol.base_url = base_url;
        }
        if let Some(user_agent) = lookup(USER_AGENT_ENV) {
            self.protocol.user_agent = user_agent;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pause_min > self.pause_max {
            return Err(ConfigError::Invalid(format!(
                "pause_min_ms ({:?}) is greater than pause_max_ms ({:?})",
                self.pause_min, self.pause_max
            )));
        }
        if self.max_in_flight == Some(0) {
            return Err(ConfigError::Invalid("max_in_flight must be at least 1".into()));
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::Invalid("request_timeout_ms must be positive".into()));
        }
        if self.protocol.base_url.is_empty() {
            return Err(ConfigError::Invalid("protocol.base_url is empty".into()));
        }
        Ok(())
    }

    pub fn max_duration(&self) -> Option<Duration> {
        self.max_duration_ms.map(Duration::from_millis)
    }
}

/// Serde adapter for durations written as whole milliseconds.
pub(crate) mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis().try_into().unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
