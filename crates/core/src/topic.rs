//! Topic patterns and routing rules.
//!
//! Patterns are matched against `"{type}.{name}"` split on dots:
//!
//! - `*` matches exactly one segment
//! - `#` matches zero or more segments
//! - anything else must match the segment literally
//!
//! Rules are evaluated most-specific first. Specificity compares segments
//! left to right (literal < `*` < `#`, lower is more specific); equal ranks
//! keep registration order.

use std::{cmp::Ordering, fmt};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
  template::{Template, TemplateError},
  time::secs_to_nanos,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopicError {
  #[error("topic pattern is empty")]
  EmptyPattern,
  #[error("topic pattern {0:?} has an empty segment")]
  EmptySegment(String),
  #[error("topic pattern {0:?} mixes wildcards with literal text in one segment")]
  PartialWildcard(String),
  #[error("invalid target for {pattern:?}: {source}")]
  InvalidTarget {
    pattern: String,
    #[source]
    source: TemplateError,
  },
  #[error("invalid storage config for {pattern:?}: {reason}")]
  InvalidStorage { pattern: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
  Literal(String),
  Single,
  Multi,
}

impl Segment {
  fn rank(&self) -> u8 {
    match self {
      Segment::Literal(_) => 0,
      Segment::Single => 1,
      Segment::Multi => 2,
    }
  }
}

/// Compiled topic match pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicPattern {
  raw: String,
  segments: Vec<Segment>,
}

impl TopicPattern {
  pub fn parse(raw: &str) -> Result<Self, TopicError> {
    if raw.is_empty() {
      return Err(TopicError::EmptyPattern);
    }

    let segments = raw
      .split('.')
      .map(|segment| match segment {
        "" => Err(TopicError::EmptySegment(raw.to_string())),
        "*" => Ok(Segment::Single),
        "#" => Ok(Segment::Multi),
        s if s.contains(['*', '#']) => Err(TopicError::PartialWildcard(raw.to_string())),
        s => Ok(Segment::Literal(s.to_string())),
      })
      .collect::<Result<Vec<_>, _>>()?;

    Ok(Self {
      raw: raw.to_string(),
      segments,
    })
  }

  pub fn as_str(&self) -> &str {
    &self.raw
  }

  pub fn is_literal(&self) -> bool {
    self.segments.iter().all(|s| matches!(s, Segment::Literal(_)))
  }

  pub fn matches(&self, subject: &str) -> bool {
    let parts: Vec<&str> = subject.split('.').collect();
    match_segments(&self.segments, &parts)
  }

  /// Total order used to sort rules: more specific patterns first.
  pub fn cmp_specificity(&self, other: &Self) -> Ordering {
    let a = self.segments.iter().map(Segment::rank);
    let b = other.segments.iter().map(Segment::rank);
    a.cmp(b)
  }
}

fn match_segments(pattern: &[Segment], parts: &[&str]) -> bool {
  match pattern.split_first() {
    None => parts.is_empty(),
    Some((Segment::Multi, rest)) => (0..=parts.len()).any(|skip| match_segments(rest, &parts[skip..])),
    Some((Segment::Single, rest)) => !parts.is_empty() && match_segments(rest, &parts[1..]),
    Some((Segment::Literal(literal), rest)) => {
      parts.first().is_some_and(|p| p == literal) && match_segments(rest, &parts[1..])
    }
  }
}

impl fmt::Display for TopicPattern {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.raw)
  }
}

/// How a target stores what is routed to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
  /// Keep only the latest message.
  #[default]
  None,
  /// Keep a windowed time series.
  Buffered,
}

/// Which timestamp an unchanged run keeps when delta coalescing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeltaKeep {
  #[default]
  Earliest,
  Latest,
}

/// Buffer parameters for `storage_type = "buffered"`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
  /// Time window in seconds.
  pub window: Option<f64>,
  /// Maximum number of entries.
  pub count: Option<usize>,
  /// Field path whose value is compared to collapse unchanged runs.
  pub delta: Option<String>,
  pub keep: DeltaKeep,
}

impl StorageConfig {
  pub fn window_nanos(&self) -> Option<i64> {
    self.window.map(secs_to_nanos)
  }

  pub fn is_empty(&self) -> bool {
    *self == Self::default()
  }

  fn validate(&self, pattern: &str) -> Result<(), TopicError> {
    let invalid = |reason: &str| TopicError::InvalidStorage {
      pattern: pattern.to_string(),
      reason: reason.to_string(),
    };

    if let Some(window) = self.window
      && !(window.is_finite() && window > 0.0)
    {
      return Err(invalid("window must be a positive number of seconds"));
    }
    if self.count == Some(0) {
      return Err(invalid("count must be at least 1"));
    }
    if let Some(delta) = &self.delta
      && delta.trim().is_empty()
    {
      return Err(invalid("delta field path is empty"));
    }
    Ok(())
  }
}

/// Serializable topic definition, as it appears in configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicSpec {
  pub pattern: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub target: Option<String>,
  #[serde(default, rename = "final")]
  pub is_final: bool,
  #[serde(default)]
  pub storage_type: StorageType,
  #[serde(default, skip_serializing_if = "StorageConfig::is_empty")]
  pub storage_config: StorageConfig,
}

impl TopicSpec {
  pub fn new(pattern: impl Into<String>, target: impl Into<String>) -> Self {
    Self {
      pattern: pattern.into(),
      target: Some(target.into()),
      is_final: false,
      storage_type: StorageType::None,
      storage_config: StorageConfig::default(),
    }
  }

  pub fn buffered(mut self, storage_config: StorageConfig) -> Self {
    self.storage_type = StorageType::Buffered;
    self.storage_config = storage_config;
    self
  }

  pub fn final_match(mut self) -> Self {
    self.is_final = true;
    self
  }
}

/// Validated, immutable routing rule.
#[derive(Debug, Clone, PartialEq)]
pub struct Topic {
  pattern: TopicPattern,
  target: Option<Template>,
  is_final: bool,
  storage_type: StorageType,
  storage_config: StorageConfig,
}

impl Topic {
  pub fn compile(spec: &TopicSpec) -> Result<Self, TopicError> {
    let pattern = TopicPattern::parse(&spec.pattern)?;

    let target = match spec.target.as_deref() {
      None | Some("") => None,
      Some(raw) => Some(Template::parse(raw).map_err(|source| TopicError::InvalidTarget {
        pattern: spec.pattern.clone(),
        source,
      })?),
    };

    match spec.storage_type {
      StorageType::None if !spec.storage_config.is_empty() => {
        return Err(TopicError::InvalidStorage {
          pattern: spec.pattern.clone(),
          reason: "storage_config requires storage_type = \"buffered\"".to_string(),
        });
      }
      StorageType::None => {}
      StorageType::Buffered => spec.storage_config.validate(&spec.pattern)?,
    }

    Ok(Self {
      pattern,
      target,
      is_final: spec.is_final,
      storage_type: spec.storage_type,
      storage_config: spec.storage_config.clone(),
    })
  }

  pub fn pattern(&self) -> &TopicPattern {
    &self.pattern
  }

  /// `None` means matching messages are discarded.
  pub fn target(&self) -> Option<&Template> {
    self.target.as_ref()
  }

  pub fn is_final(&self) -> bool {
    self.is_final
  }

  pub fn storage_type(&self) -> StorageType {
    self.storage_type
  }

  pub fn storage_config(&self) -> &StorageConfig {
    &self.storage_config
  }

  pub fn to_spec(&self) -> TopicSpec {
    TopicSpec {
      pattern: self.pattern.raw.clone(),
      target: self.target.as_ref().map(|t| t.as_str().to_string()),
      is_final: self.is_final,
      storage_type: self.storage_type,
      storage_config: self.storage_config.clone(),
    }
  }
}
