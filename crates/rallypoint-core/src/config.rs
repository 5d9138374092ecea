//! Shared configuration for the map sync pipeline.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::records::{AssemblyArea, Position};

/// Longest accepted poll period: one day.
pub const MAX_POLL_INTERVAL_SECS: u64 = 86_400;

/// Real-world UTC offsets stay within fourteen hours.
const MAX_UTC_OFFSET_MINUTES: i32 = 14 * 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("config JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Settings for one map consumer. Every field has a default, so a config
/// file only needs the keys it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    /// Backend base URL, without trailing slash.
    pub api_base_url: String,
    pub poll_interval_secs: u64,
    pub request_timeout_secs: u64,
    pub position_timeout_secs: u64,
    /// Sign-in lifetime from `token set`; 0 keeps sessions until cleared.
    pub session_timeout_secs: u64,
    /// Offset of the backend's local clock, used for zone-less timestamps.
    pub backend_utc_offset_minutes: i32,
    /// Used when there is neither a live fix nor a persisted one.
    pub default_position: Position,
    pub assembly_areas: Vec<AssemblyArea>,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:5000".to_string(),
            poll_interval_secs: 30,
            request_timeout_secs: 10,
            position_timeout_secs: 15,
            session_timeout_secs: 900,
            // The production backend runs on Turkey time, UTC+3 all year.
            backend_utc_offset_minutes: 180,
            default_position: Position::new(37.0, 35.3),
            assembly_areas: vec![
                AssemblyArea::new("A1", 37.002, 35.322),
                AssemblyArea::new("A2", 37.005, 35.325),
            ],
        }
    }
}

impl MapConfig {
    /// Parse and validate a JSON config document.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.api_base_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::Invalid(format!(
                "api_base_url must be an http(s) URL, got {url:?}"
            )));
        }
        for (name, value) in [
            ("poll_interval_secs", self.poll_interval_secs),
            ("request_timeout_secs", self.request_timeout_secs),
            ("position_timeout_secs", self.position_timeout_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{name} must be positive")));
            }
        }
        if self.poll_interval_secs > MAX_POLL_INTERVAL_SECS {
            return Err(ConfigError::Invalid(format!(
                "poll_interval_secs must be at most {MAX_POLL_INTERVAL_SECS}"
            )));
        }
        if self.backend_utc_offset_minutes.abs() > MAX_UTC_OFFSET_MINUTES {
            return Err(ConfigError::Invalid(format!(
                "backend_utc_offset_minutes must be within ±{MAX_UTC_OFFSET_MINUTES}"
            )));
        }
        if !self.default_position.is_valid() {
            return Err(ConfigError::Invalid(
                "default_position is out of range".to_string(),
            ));
        }
        if let Some(area) = self
            .assembly_areas
            .iter()
            .find(|a| !Position::new(a.latitude, a.longitude).is_valid())
        {
            return Err(ConfigError::Invalid(format!(
                "assembly area {} is out of range",
                area.id
            )));
        }
        Ok(())
    }

    pub fn base_url(&self) -> &str {
        self.api_base_url.trim().trim_end_matches('/')
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn position_timeout(&self) -> Duration {
        Duration::from_secs(self.position_timeout_secs)
    }

    /// `None` when sessions never time out.
    pub fn session_timeout(&self) -> Option<Duration> {
        (self.session_timeout_secs > 0).then(|| Duration::from_secs(self.session_timeout_secs))
    }

    /// Falls back to UTC for an offset `validate` would reject.
    pub fn backend_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.backend_utc_offset_minutes.saturating_mul(60))
            .unwrap_or_else(|| Utc.fix())
    }
}
