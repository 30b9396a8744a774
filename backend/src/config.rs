//! Runtime configuration.
//!
//! Settings are read from a TOML file, then selected values are overridden
//! from the environment:
//!
//! - `LGS_CONFIG`: path of the TOML file (otherwise `lgs.toml` is searched in
//!   the current directory, `backend/` and the parent directory)
//! - `HOST` / `PORT`: HTTP bind address
//! - `LGS_AUTO_SHUTTER`: `true`/`false`, `1`/`0`
//! - `LGS_GATEWAY_ADDRESS`: telescope-control gateway address
//! - `LGS_COLLISION_FEED_URL`: collision feed URL
//!
//! Every section and field has a default, so an empty file is valid.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::parsing::FeedFormat;

pub const CONFIG_PATH_ENV: &str = "LGS_CONFIG";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Full service configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LgsConfig {
    pub site: SiteSettings,
    pub safety: SafetySettings,
    pub gateway: GatewaySettings,
    pub collision_feed: CollisionFeedSettings,
    pub clustering: ClusteringSettings,
    pub http: HttpSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteSettings {
    pub name: String,
    /// Our own tag in the collision feed.
    pub observatory: String,
}

impl Default for SiteSettings {
    fn default() -> Self {
        Self {
            name: "GS".to_string(),
            observatory: "GEMINI-S".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetySettings {
    pub error_cone_arcsec: f64,
    pub pre_margin_secs: i64,
    pub post_margin_secs: i64,
    pub auto_shutter: bool,
    pub decision_period_ms: u64,
    /// How far ahead an upcoming shutter raises an alert.
    pub warning_horizon_secs: i64,
}

impl Default for SafetySettings {
    fn default() -> Self {
        Self {
            error_cone_arcsec: default_error_cone_arcsec(),
            pre_margin_secs: 0,
            post_margin_secs: 0,
            auto_shutter: false,
            decision_period_ms: default_decision_period_ms(),
            warning_horizon_secs: default_warning_horizon_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewaySettings {
    pub address: String,
    pub poll_period_ms: u64,
    pub timeout_ms: u64,
    pub heartbeat_period_ms: u64,
    pub max_update_age_ms: u64,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            address: "simulated".to_string(),
            poll_period_ms: 500,
            timeout_ms: 2000,
            heartbeat_period_ms: 1000,
            max_update_age_ms: 3000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollisionFeedSettings {
    /// Empty disables polling; the feed then stays absent and the verdict
    /// stays at shutter.
    pub url: String,
    pub format: FeedFormat,
    pub poll_period_secs: u64,
    pub timeout_secs: u64,
    pub max_age_secs: u64,
}

impl Default for CollisionFeedSettings {
    fn default() -> Self {
        Self {
            url: String::new(),
            format: FeedFormat::Text,
            poll_period_secs: 30,
            timeout_secs: 10,
            max_age_secs: 120,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusteringSettings {
    pub max_distance_deg: f64,
    pub min_above_limit_minutes: i64,
}

impl Default for ClusteringSettings {
    fn default() -> Self {
        Self {
            max_distance_deg: default_max_distance_deg(),
            min_above_limit_minutes: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub host: String,
    pub port: u16,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

fn default_error_cone_arcsec() -> f64 {
    20.0
}

fn default_decision_period_ms() -> u64 {
    1000
}

fn default_warning_horizon_secs() -> i64 {
    60
}

// About one arcminute.
fn default_max_distance_deg() -> f64 {
    0.0167
}

impl LgsConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load `lgs.toml` from the first standard location that has one.
    ///
    /// Searches:
    /// 1. Current directory
    /// 2. `backend/` directory
    /// 3. Parent directory
    ///
    /// Falls back to defaults when none exists.
    pub fn from_default_location() -> Result<Self, ConfigError> {
        let search_paths = [
            PathBuf::from("lgs.toml"),
            PathBuf::from("backend/lgs.toml"),
            PathBuf::from("../lgs.toml"),
        ];

        for path in search_paths {
            if path.exists() {
                return Self::from_file(&path);
            }
        }

        Ok(Self::default())
    }

    /// File (from `LGS_CONFIG` or the default locations), then environment
    /// overrides, then validation.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match env::var(CONFIG_PATH_ENV) {
            Ok(path) if !path.is_empty() => Self::from_file(path)?,
            _ => Self::from_default_location()?,
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Override fields from `HOST`, `PORT`, `LGS_AUTO_SHUTTER`,
    /// `LGS_GATEWAY_ADDRESS` and `LGS_COLLISION_FEED_URL`.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(host) = env::var("HOST") {
            self.http.host = host;
        }
        if let Ok(port) = env::var("PORT") {
            self.http.port = port
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("PORT '{}' is not a port number", port)))?;
        }
        if let Ok(flag) = env::var("LGS_AUTO_SHUTTER") {
            self.safety.auto_shutter = parse_flag(&flag).ok_or_else(|| {
                ConfigError::Invalid(format!("LGS_AUTO_SHUTTER '{}' is not a boolean", flag))
            })?;
        }
        if let Ok(address) = env::var("LGS_GATEWAY_ADDRESS") {
            self.gateway.address = address;
        }
        if let Ok(url) = env::var("LGS_COLLISION_FEED_URL") {
            self.collision_feed.url = url;
        }
        Ok(())
    }

    /// Reject settings the monitor cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let periods = [
            ("safety.decision_period_ms", self.safety.decision_period_ms),
            ("gateway.poll_period_ms", self.gateway.poll_period_ms),
            ("gateway.timeout_ms", self.gateway.timeout_ms),
            ("gateway.heartbeat_period_ms", self.gateway.heartbeat_period_ms),
            ("gateway.max_update_age_ms", self.gateway.max_update_age_ms),
            ("collision_feed.poll_period_secs", self.collision_feed.poll_period_secs),
            ("collision_feed.timeout_secs", self.collision_feed.timeout_secs),
            ("collision_feed.max_age_secs", self.collision_feed.max_age_secs),
        ];
        if let Some((name, _)) = periods.iter().find(|(_, v)| *v == 0) {
            return Err(ConfigError::Invalid(format!("{} must be positive", name)));
        }

        if !(self.safety.error_cone_arcsec.is_finite() && self.safety.error_cone_arcsec >= 0.0) {
            return Err(ConfigError::Invalid(
                "safety.error_cone_arcsec must be a non-negative number".to_string(),
            ));
        }
        for (name, value) in [
            ("safety.pre_margin_secs", self.safety.pre_margin_secs),
            ("safety.post_margin_secs", self.safety.post_margin_secs),
            ("safety.warning_horizon_secs", self.safety.warning_horizon_secs),
            ("clustering.min_above_limit_minutes", self.clustering.min_above_limit_minutes),
        ] {
            if value < 0 {
                return Err(ConfigError::Invalid(format!("{} must not be negative", name)));
            }
        }
        if !(self.clustering.max_distance_deg.is_finite() && self.clustering.max_distance_deg > 0.0)
        {
            return Err(ConfigError::Invalid(
                "clustering.max_distance_deg must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl SafetySettings {
    pub fn decision_period(&self) -> Duration {
        Duration::from_millis(self.decision_period_ms)
    }

    pub fn pre_margin(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.pre_margin_secs)
    }

    pub fn post_margin(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.post_margin_secs)
    }

    pub fn warning_horizon(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.warning_horizon_secs)
    }
}

impl GatewaySettings {
    pub fn poll_period(&self) -> Duration {
        Duration::from_millis(self.poll_period_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn heartbeat_period(&self) -> Duration {
        Duration::from_millis(self.heartbeat_period_ms)
    }

    pub fn max_update_age(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.max_update_age_ms as i64)
    }
}

impl CollisionFeedSettings {
    pub fn poll_period(&self) -> Duration {
        Duration::from_secs(self.poll_period_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn max_age(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.max_age_secs as i64)
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
