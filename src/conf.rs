//! Tunables of a partial download.
//!
//! All values have defaults, so an empty TOML document is a valid
//! configuration. Durations are given in seconds.

use std::time::Duration;

use serde::de;
use serde_derive::Deserialize;

use crate::error::conf::Result;

/// The bytes requested from the head of each file for its preview: enough
/// for a short clip or a full size image.
pub const DEFAULT_PREVIEW_CAP: u64 = 8 * 1024 * 1024;

/// The estimated piece data a single download request may cover.
pub const DEFAULT_MAX_REQUEST_BYTES: u64 = 64 * 1024 * 1024;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Conf {
    pub plan: PlanConf,
    pub download: DownloadConf,
}

impl Conf {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlanConf {
    pub preview_cap: u64,
    pub max_request_bytes: u64,
}

impl Default for PlanConf {
    fn default() -> Self {
        Self {
            preview_cap: DEFAULT_PREVIEW_CAP,
            max_request_bytes: DEFAULT_MAX_REQUEST_BYTES,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DownloadConf {
    /// The wall-clock deadline of a whole download.
    #[serde(rename = "timeout_secs", deserialize_with = "deserialize_seconds")]
    pub timeout: Duration,
    /// How often the swarm is probed for liveness while waiting.
    #[serde(rename = "probe_interval_secs", deserialize_with = "deserialize_seconds")]
    pub probe_interval: Duration,
}

impl Default for DownloadConf {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            probe_interval: Duration::from_secs(10),
        }
    }
}

/// Deserialize an integer representing seconds into `Duration`.
fn deserialize_seconds<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: de::Deserializer<'de>,
{
    let s: u64 = de::Deserialize::deserialize(deserializer)?;
    Ok(Duration::from_secs(s))
}
