//! Data health checks.

use std::collections::BTreeMap;

use edgewire_core::{Check, TopicPattern, time::secs_to_nanos};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::state::{State, Stored};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataStatus {
  /// Nothing stored under the name.
  Missing,
  /// Latest value older than `max_lag`.
  Stale,
  /// Fewer buffered entries than `min_count`.
  LowCount,
  /// A gap between buffered entries wider than `max_gap`.
  LowFreq,
}

/// Evaluate `checks` against `state` at `timestamp`.
///
/// Names containing wildcards expand over `inputs`. Only failing names are
/// reported; when several conditions fail the last evaluated wins
/// (stale over low frequency over low count).
pub fn data_status<'a>(
  state: &State,
  checks: &BTreeMap<String, Check>,
  inputs: impl Iterator<Item = &'a str> + Clone,
  timestamp: i64,
) -> BTreeMap<String, DataStatus> {
  let mut status = BTreeMap::new();

  for (name, check) in checks {
    let names: Vec<String> = if name.contains(['*', '#']) {
      match TopicPattern::parse(name) {
        Ok(pattern) => inputs.clone().filter(|input| pattern.matches(input)).map(str::to_string).collect(),
        Err(e) => {
          warn!(check = %name, error = %e, "Invalid check pattern");
          continue;
        }
      }
    } else {
      vec![name.clone()]
    };

    for name in names {
      if let Some(result) = evaluate(state.get(&name), check, timestamp) {
        status.insert(name, result);
      }
    }
  }

  status
}

fn evaluate(stored: Option<&Stored>, check: &Check, timestamp: i64) -> Option<DataStatus> {
  let stored = match stored {
    Some(stored) if !stored.is_empty() => stored,
    _ => return Some(DataStatus::Missing),
  };

  let mut result = None;

  if let Stored::Buffer(buffer) = stored {
    if let Some(min_count) = check.min_count
      && buffer.len() < min_count
    {
      result = Some(DataStatus::LowCount);
    }

    if let Some(max_gap) = check.max_gap {
      let max_gap = secs_to_nanos(max_gap);
      let timestamps: Vec<i64> = buffer.timestamps().collect();
      if timestamps.windows(2).any(|w| w[1] - w[0] > max_gap) {
        result = Some(DataStatus::LowFreq);
      }
    }
  }

  if let Some(max_lag) = check.max_lag
    && let Some(latest) = stored.latest()
    && latest.time_of_validity() < timestamp.saturating_sub(secs_to_nanos(max_lag))
  {
    result = Some(DataStatus::Stale);
  }

  result
}
