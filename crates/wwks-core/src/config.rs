//! Configuration for the WWKS client.
//!
//! A single JSON file holds module metadata (name, log path), the robot
//! endpoint and the client-side protocol settings. Everything except the
//! robot host has a default matching a stock installation.
//!
//! # Example
//!
//! ```json
//! {
//!   "module": { "module_name": "wwks-runner", "log_path": "/tmp/log" },
//!   "robot":  { "host": "10.0.0.20", "port": 6050 },
//!   "client": { "source_id": 100, "stock_location": "None" }
//! }
//! ```

use serde::Deserialize;

use crate::error::{Result, WwksError};
use crate::framing::FramePolicy;

/// Top-level application config, deserialized from a JSON file.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Module metadata (name, log path).
    #[serde(default)]
    pub module: Option<ModuleMeta>,

    /// Robot endpoint and link timing.
    pub robot: RobotConfig,

    /// Client identity and request settings.
    #[serde(default)]
    pub client: ClientConfig,
}

impl AppConfig {
    /// Module name from the metadata block, or `fallback`.
    pub fn module_name(&self, fallback: &str) -> String {
        self.module
            .as_ref()
            .and_then(|m| m.module_name.clone())
            .unwrap_or_else(|| fallback.to_string())
    }

    /// Log directory, when configured.
    pub fn log_path(&self) -> Option<String> {
        self.module.as_ref().and_then(|m| m.log_path.clone())
    }

    /// Reject values that would make the client misbehave at runtime.
    pub fn validate(&self) -> Result<()> {
        self.robot.validate()?;
        self.client.validate()
    }
}

/// Module metadata block.
#[derive(Debug, Clone, Deserialize)]
pub struct ModuleMeta {
    pub module_name: Option<String>,
    pub log_path: Option<String>,
}

/// Robot endpoint and connection timing.
#[derive(Debug, Clone, Deserialize)]
pub struct RobotConfig {
    /// Robot host name or IP address.
    pub host: String,

    /// Robot TCP port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Interval of the liveness probe, in milliseconds.
    #[serde(default = "default_probe_interval_ms")]
    pub probe_interval_ms: u64,

    /// Upper bound for a single connect attempt, in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Handling of bytes after the first end tag in one read.
    #[serde(default)]
    pub frame_policy: FramePolicy,

    /// Largest unfinished frame kept before the link is dropped.
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
}

impl RobotConfig {
    /// Config for `host:port` with every other field at its default.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            probe_interval_ms: default_probe_interval_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            frame_policy: FramePolicy::default(),
            max_frame_bytes: default_max_frame_bytes(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(WwksError::Config("robot.host must not be empty".into()));
        }
        if self.port == 0 {
            return Err(WwksError::Config("robot.port must not be 0".into()));
        }
        if self.probe_interval_ms == 0 {
            return Err(WwksError::Config("robot.probe_interval_ms must be > 0".into()));
        }
        if self.connect_timeout_ms == 0 {
            return Err(WwksError::Config("robot.connect_timeout_ms must be > 0".into()));
        }
        if self.max_frame_bytes == 0 {
            return Err(WwksError::Config("robot.max_frame_bytes must be > 0".into()));
        }
        Ok(())
    }
}

/// Client identity and request parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// `Source` written on every request and the subscriber id in the hello.
    #[serde(default = "default_source_id")]
    pub source_id: u32,

    /// `StockLocationId` criteria for stock queries.
    #[serde(default = "default_stock_location")]
    pub stock_location: String,

    /// Default `OutputDestination` of output requests.
    #[serde(default = "default_output_destination")]
    pub output_destination: String,

    /// Default `Priority` of output requests.
    #[serde(default = "default_priority")]
    pub priority: String,

    /// Delay before a search probe fires, in milliseconds.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Prefix prepended to search terms to form the probed article id.
    #[serde(default = "default_article_prefix")]
    pub search_prefix: String,

    /// Foreign output events are only probed for articles containing this.
    /// Empty means every article.
    #[serde(default = "default_article_prefix")]
    pub probe_filter: String,

    /// Full stock refresh interval while connected. Unset disables it.
    #[serde(default)]
    pub refresh_interval_secs: Option<u64>,

    /// Age after which an unacknowledged order is re-queried. Unset disables it.
    #[serde(default)]
    pub order_timeout_secs: Option<u64>,

    /// Identity announced in the hello request.
    #[serde(default)]
    pub subscriber: SubscriberConfig,
}

impl ClientConfig {
    pub fn validate(&self) -> Result<()> {
        if self.refresh_interval_secs == Some(0) {
            return Err(WwksError::Config(
                "client.refresh_interval_secs must be > 0 when set".into(),
            ));
        }
        if self.order_timeout_secs == Some(0) {
            return Err(WwksError::Config(
                "client.order_timeout_secs must be > 0 when set".into(),
            ));
        }
        Ok(())
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            source_id: default_source_id(),
            stock_location: default_stock_location(),
            output_destination: default_output_destination(),
            priority: default_priority(),
            debounce_ms: default_debounce_ms(),
            search_prefix: default_article_prefix(),
            probe_filter: default_article_prefix(),
            refresh_interval_secs: None,
            order_timeout_secs: None,
            subscriber: SubscriberConfig::default(),
        }
    }
}

/// Subscriber attributes announced in the hello request.
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriberConfig {
    #[serde(default = "default_manufacturer")]
    pub manufacturer: String,
    #[serde(default = "default_product_info")]
    pub product_info: String,
    #[serde(default = "default_version_info")]
    pub version_info: String,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            manufacturer: default_manufacturer(),
            product_info: default_product_info(),
            version_info: default_version_info(),
        }
    }
}

// ---------------------------------------------------------------------------
// Defaults (used by serde)
// ---------------------------------------------------------------------------

fn default_port() -> u16 {
    6050
}

fn default_probe_interval_ms() -> u64 {
    3000
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

fn default_max_frame_bytes() -> usize {
    1024 * 1024
}

fn default_source_id() -> u32 {
    100
}

fn default_stock_location() -> String {
    "None".into()
}

fn default_output_destination() -> String {
    "001".into()
}

fn default_priority() -> String {
    "Normal".into()
}

fn default_debounce_ms() -> u64 {
    100
}

fn default_article_prefix() -> String {
    "RoWa".into()
}

fn default_manufacturer() -> String {
    "wwks-rs".into()
}

fn default_product_info() -> String {
    "WWKS pickup client".into()
}

fn default_version_info() -> String {
    env!("CARGO_PKG_VERSION").into()
}

/// Load and parse a JSON config file.
pub fn load_config(path: &std::path::Path) -> anyhow::Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: AppConfig = serde_json::from_str(&content)?;
    config.validate()?;
    Ok(config)
}
