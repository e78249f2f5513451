//! Configuration for edgewire applications.
//!
//! Config priority: explicit path > `$EDGEWIRE_CONFIG` > user (~/.config/edgewire/config.toml) > defaults.
//! Every section is optional; missing fields fall back to their defaults.

use std::{
  collections::BTreeMap,
  path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
  time::secs_to_nanos,
  topic::{Topic, TopicError, TopicSpec},
};

pub const CONFIG_ENV: &str = "EDGEWIRE_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("failed to parse config: {0}")]
  Parse(#[from] toml::de::Error),
  #[error("failed to serialize config: {0}")]
  Serialize(#[from] toml::ser::Error),
  #[error(transparent)]
  Topic(#[from] TopicError),
  #[error("invalid check {name:?}: {reason}")]
  InvalidCheck { name: String, reason: String },
  #[error("invalid limit {name:?}: {reason}")]
  InvalidLimit { name: String, reason: String },
  #[error("invalid app config: {0}")]
  Invalid(String),
}

// ============================================================================
// Rules
// ============================================================================

/// Data freshness rule used for health reporting.
///
/// Durations are seconds. Names may contain `*`/`#` wildcards, which expand
/// over the declared inputs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Check {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub min_count: Option<usize>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub max_gap: Option<f64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub max_lag: Option<f64>,
}

impl Check {
  pub fn validate(&self, name: &str) -> Result<(), ConfigError> {
    for (field, value) in [("max_gap", self.max_gap), ("max_lag", self.max_lag)] {
      if let Some(value) = value
        && !(value.is_finite() && value >= 0.0)
      {
        return Err(ConfigError::InvalidCheck {
          name: name.to_string(),
          reason: format!("{field} must be a non-negative number of seconds"),
        });
      }
    }
    Ok(())
  }
}

/// Emission rate rule for an output name. Durations are seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limit {
  /// Minimum interval between delivered emissions.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub frequency: Option<f64>,
  /// Updates closer than this are coalesced into the last known value.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub throttle: Option<f64>,
}

impl Limit {
  pub fn frequency(secs: f64) -> Self {
    Self {
      frequency: Some(secs),
      throttle: None,
    }
  }

  pub fn throttle_nanos(&self) -> i64 {
    self.throttle.map(secs_to_nanos).unwrap_or(0)
  }

  pub fn frequency_nanos(&self) -> i64 {
    self.frequency.map(secs_to_nanos).unwrap_or(0)
  }

  pub fn validate(&self, name: &str) -> Result<(), ConfigError> {
    for (field, value) in [("frequency", self.frequency), ("throttle", self.throttle)] {
      if let Some(value) = value
        && !(value.is_finite() && value >= 0.0)
      {
        return Err(ConfigError::InvalidLimit {
          name: name.to_string(),
          reason: format!("{field} must be a non-negative number of seconds"),
        });
      }
    }
    Ok(())
  }
}

/// Topics, checks and limits as a unit.
///
/// Topic order is registration order; checks and limits are keyed by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleSet {
  pub topics: Vec<TopicSpec>,
  pub checks: BTreeMap<String, Check>,
  pub limits: BTreeMap<String, Limit>,
}

impl RuleSet {
  pub fn validate(&self) -> Result<(), ConfigError> {
    for topic in &self.topics {
      Topic::compile(topic)?;
    }
    for (name, check) in &self.checks {
      check.validate(name)?;
    }
    for (name, limit) in &self.limits {
      limit.validate(name)?;
    }
    Ok(())
  }
}

/// Merge two rule sets key-wise; entries in `overlay` win.
///
/// A topic in `overlay` with the same pattern as one in `base` replaces it in
/// place, new patterns are appended in `overlay` order.
pub fn merge(base: &RuleSet, overlay: &RuleSet) -> RuleSet {
  let mut topics = base.topics.clone();
  for topic in &overlay.topics {
    match topics.iter_mut().find(|t| t.pattern == topic.pattern) {
      Some(existing) => *existing = topic.clone(),
      None => topics.push(topic.clone()),
    }
  }

  let mut checks = base.checks.clone();
  checks.extend(overlay.checks.iter().map(|(k, v)| (k.clone(), *v)));

  let mut limits = base.limits.clone();
  limits.extend(overlay.limits.iter().map(|(k, v)| (k.clone(), *v)));

  RuleSet { topics, checks, limits }
}

// ============================================================================
// App Configuration
// ============================================================================

/// A declared input or output stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageInfo {
  pub name: String,
  #[serde(rename = "type")]
  pub type_name: String,
}

impl MessageInfo {
  pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      type_name: type_name.into(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
  /// Hold-back before a received message is processed, seconds.
  pub delay: f64,
  /// Lookback read at startup to pre-populate state, seconds.
  pub pre_fill: f64,
  pub remove_duplicates: bool,
  /// Use message time instead of wall time as "now" when processing.
  pub offset_timestamps: bool,
  /// Field paths whose values form the asset key. Empty means one global state.
  pub asset_getter: Vec<String>,
  /// Seed dedup and limit state from the last stored outputs at startup.
  pub last_outputs: bool,
  /// Poll cadence for the runner, seconds. `None` disables polling.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub poll_interval: Option<f64>,
  pub inputs: Vec<MessageInfo>,
  pub outputs: Vec<MessageInfo>,
  pub topics: Vec<TopicSpec>,
  pub checks: BTreeMap<String, Check>,
  pub limits: BTreeMap<String, Limit>,
}

impl Default for AppConfig {
  fn default() -> Self {
    Self {
      delay: 0.0,
      pre_fill: 0.0,
      remove_duplicates: true,
      offset_timestamps: false,
      asset_getter: Vec::new(),
      last_outputs: false,
      poll_interval: None,
      inputs: Vec::new(),
      outputs: Vec::new(),
      topics: default_topics(),
      checks: BTreeMap::new(),
      limits: BTreeMap::new(),
    }
  }
}

/// Route everything to a target named after the message.
pub fn default_topics() -> Vec<TopicSpec> {
  vec![TopicSpec::new("#", "{name}")]
}

impl AppConfig {
  pub fn delay_nanos(&self) -> i64 {
    secs_to_nanos(self.delay)
  }

  pub fn pre_fill_nanos(&self) -> i64 {
    secs_to_nanos(self.pre_fill)
  }

  pub fn rules(&self) -> RuleSet {
    RuleSet {
      topics: self.topics.clone(),
      checks: self.checks.clone(),
      limits: self.limits.clone(),
    }
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    for (field, value) in [("delay", self.delay), ("pre_fill", self.pre_fill)] {
      if !(value.is_finite() && value >= 0.0) {
        return Err(ConfigError::Invalid(format!("{field} must be a non-negative number of seconds")));
      }
    }
    if let Some(poll) = self.poll_interval
      && !(poll.is_finite() && poll > 0.0)
    {
      return Err(ConfigError::Invalid("poll_interval must be positive".to_string()));
    }
    if self.asset_getter.iter().any(|path| path.trim().is_empty()) {
      return Err(ConfigError::Invalid("asset_getter contains an empty field path".to_string()));
    }
    self.rules().validate()
  }
}

// ============================================================================
// Transport Configuration
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
  #[default]
  None,
  Gzip,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
  /// Address requests are published to.
  pub publish_addr: String,
  /// Address responses are received from.
  pub subscribe_addr: String,
  /// Frame topic prefix.
  pub topic: String,
  pub compression: Compression,
  pub receive_timeout_ms: u64,
  pub max_frame_bytes: usize,
  /// Source recorded in request headers.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub source: Option<String>,
}

impl Default for TransportConfig {
  fn default() -> Self {
    Self {
      publish_addr: "127.0.0.1:5555".to_string(),
      subscribe_addr: "127.0.0.1:5556".to_string(),
      topic: "edgewire".to_string(),
      compression: Compression::None,
      receive_timeout_ms: 1000,
      max_frame_bytes: 16 * 1024 * 1024,
      source: None,
    }
  }
}

// ============================================================================
// Logging Configuration
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
  /// Log level (error, warn, info, debug, trace)
  pub log_level: String,
  /// Log file directory. Console only when unset.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub log_dir: Option<PathBuf>,
  /// Log rotation (daily, hourly, never)
  pub log_rotation: String,
}

impl Default for LoggingConfig {
  fn default() -> Self {
    Self {
      log_level: "info".to_string(),
      log_dir: None,
      log_rotation: "daily".to_string(),
    }
  }
}

// ============================================================================
// Main Configuration
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub app: AppConfig,

  #[serde(default)]
  pub transport: TransportConfig,

  #[serde(default)]
  pub logging: LoggingConfig,
}

impl Config {
  /// Load config from the first location that exists.
  ///
  /// An explicit path must exist; the fallbacks are skipped when missing.
  pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
    if let Some(path) = explicit {
      return Self::load_from(path);
    }

    if let Ok(path) = std::env::var(CONFIG_ENV) {
      return Self::load_from(Path::new(&path));
    }

    if let Some(path) = Self::user_config_path()
      && path.exists()
    {
      return Self::load_from(&path);
    }

    Ok(Self::default())
  }

  pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
      path: path.to_path_buf(),
      source,
    })?;
    let config = Self::from_toml_str(&content)?;
    tracing::debug!(path = %path.display(), "Loaded config");
    Ok(config)
  }

  /// Parse and validate a TOML document.
  pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
    let config: Self = toml::from_str(content)?;
    config.app.validate()?;
    Ok(config)
  }

  pub fn to_toml(&self) -> Result<String, ConfigError> {
    Ok(toml::to_string_pretty(self)?)
  }

  /// Get the user-level config path
  pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p: PathBuf| p.join("edgewire").join("config.toml"))
  }
}
