//! Windowed, time-ordered message buffer.
//!
//! Entries are kept sorted by timestamp with no duplicates: inserting at an
//! existing timestamp overwrites. An optional time window and count window
//! bound the buffer when [`DataBuffer::trim`] runs, and an optional delta
//! projection collapses runs of unchanged values.

use std::{collections::BTreeMap, fmt, sync::Arc};

use edgewire_core::{DeltaKeep, Message, StorageConfig};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BufferError {
  #[error("delta projection failed for {message}: {reason}")]
  Projection { message: String, reason: String },
}

type ProjectFn = dyn Fn(&Message) -> Result<Value, String> + Send + Sync;

/// Value compared between neighbours when delta coalescing.
#[derive(Clone)]
pub enum Projection {
  /// A message field by dotted path.
  Field(String),
  Custom(Arc<ProjectFn>),
}

impl Projection {
  pub fn custom(f: impl Fn(&Message) -> Result<Value, String> + Send + Sync + 'static) -> Self {
    Projection::Custom(Arc::new(f))
  }

  fn project(&self, message: &Message) -> Result<Value, BufferError> {
    let result = match self {
      Projection::Field(path) => message.field(path).ok_or_else(|| format!("no field {path:?}")),
      Projection::Custom(f) => f(message),
    };
    result.map_err(|reason| BufferError::Projection {
      message: message.subject(),
      reason,
    })
  }
}

impl fmt::Debug for Projection {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Projection::Field(path) => f.debug_tuple("Field").field(path).finish(),
      Projection::Custom(_) => f.write_str("Custom(..)"),
    }
  }
}

#[derive(Debug, Clone)]
struct Entry {
  timestamp: i64,
  message: Message,
  projected: Option<Value>,
}

/// Columnar view of a buffer: one row per entry, one column per payload field.
///
/// Rows missing a field hold `Value::Null`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Series {
  pub timestamps: Vec<i64>,
  pub columns: BTreeMap<String, Vec<Value>>,
}

impl Series {
  pub fn len(&self) -> usize {
    self.timestamps.len()
  }

  pub fn is_empty(&self) -> bool {
    self.timestamps.is_empty()
  }

  pub fn column(&self, name: &str) -> Option<&[Value]> {
    self.columns.get(name).map(Vec::as_slice)
  }

  fn push(&mut self, entry: &Entry) {
    let row = self.timestamps.len();
    self.timestamps.push(entry.timestamp);
    for (key, value) in entry.message.payload() {
      self
        .columns
        .entry(key.clone())
        .or_insert_with(|| vec![Value::Null; row])
        .push(value.clone());
    }
    for column in self.columns.values_mut() {
      if column.len() == row {
        column.push(Value::Null);
      }
    }
  }

  fn truncate(&mut self, len: usize) {
    self.timestamps.truncate(len);
    for column in self.columns.values_mut() {
      column.truncate(len);
    }
    self.columns.retain(|_, column| column.iter().any(|v| !v.is_null()));
  }

  fn drain_front(&mut self, n: usize) {
    self.timestamps.drain(..n);
    for column in self.columns.values_mut() {
      column.drain(..n);
    }
    self.columns.retain(|_, column| column.iter().any(|v| !v.is_null()));
  }
}

#[derive(Debug, Clone, Default)]
pub struct DataBuffer {
  entries: Vec<Entry>,
  /// Time window in nanoseconds.
  window: Option<i64>,
  count: Option<usize>,
  delta: Option<Projection>,
  keep: DeltaKeep,
  /// Effective cutoff of the last trim; cleared by inserts.
  last_trim: Option<i64>,
  series: Series,
  /// Number of leading entries `series` is up to date for.
  series_valid: usize,
}

impl DataBuffer {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn from_config(config: &StorageConfig) -> Self {
    Self {
      window: config.window_nanos(),
      count: config.count,
      delta: config.delta.clone().map(Projection::Field),
      keep: config.keep,
      ..Self::default()
    }
  }

  pub fn with_window(mut self, window: i64) -> Self {
    self.window = Some(window);
    self
  }

  pub fn with_count(mut self, count: usize) -> Self {
    self.count = Some(count);
    self
  }

  pub fn with_delta(mut self, projection: Projection, keep: DeltaKeep) -> Self {
    self.delta = Some(projection);
    self.keep = keep;
    self
  }

  pub fn window(&self) -> Option<i64> {
    self.window
  }

  pub fn count(&self) -> Option<usize> {
    self.count
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Insert `message` at `timestamp`.
  ///
  /// Fails only when the delta projection fails; the buffer is unchanged in
  /// that case.
  pub fn insert(&mut self, timestamp: i64, message: Message) -> Result<(), BufferError> {
    let projected = match &self.delta {
      Some(projection) => Some(projection.project(&message)?),
      None => None,
    };

    let index = self.entries.partition_point(|e| e.timestamp < timestamp);
    let entry = Entry {
      timestamp,
      message,
      projected,
    };

    if self.entries.get(index).is_some_and(|e| e.timestamp == timestamp) {
      self.entries[index] = entry;
      self.invalidate(index);
      return Ok(());
    }

    if let Some(value) = &entry.projected {
      let same = |i: usize| self.entries.get(i).is_some_and(|e| e.projected.as_ref() == Some(value));
      let before = index.checked_sub(1).filter(|&i| same(i));
      let after = Some(index).filter(|&i| same(i));

      match self.keep {
        // the run already starts earlier
        DeltaKeep::Earliest if before.is_some() => return Ok(()),
        DeltaKeep::Earliest if after.is_some() => {
          self.entries[index] = entry;
          self.invalidate(index);
          return Ok(());
        }
        // the run already ends later
        DeltaKeep::Latest if after.is_some() => return Ok(()),
        DeltaKeep::Latest if before.is_some() => {
          self.entries[index - 1] = entry;
          self.invalidate(index - 1);
          return Ok(());
        }
        _ => {}
      }
    }

    self.entries.insert(index, entry);
    self.invalidate(index);
    Ok(())
  }

  /// Append messages keyed by their own time of validity.
  pub fn extend(&mut self, messages: impl IntoIterator<Item = Message>) -> Result<(), BufferError> {
    for message in messages {
      self.insert(message.time_of_validity(), message)?;
    }
    Ok(())
  }

  fn invalidate(&mut self, index: usize) {
    self.last_trim = None;
    self.series_valid = self.series_valid.min(index);
  }

  /// Apply the time and count windows relative to `now`.
  ///
  /// The time window keeps entries at or after `max(now, newest) - window`;
  /// the count window then keeps the newest `count` entries. Returns the
  /// removed prefix, oldest first. Repeating a trim with nothing inserted in
  /// between is a no-op.
  pub fn trim(&mut self, now: i64) -> Vec<(i64, Message)> {
    let Some(newest) = self.entries.last().map(|e| e.timestamp) else {
      return Vec::new();
    };
    let reference = now.max(newest);
    if self.last_trim == Some(reference) {
      return Vec::new();
    }
    self.last_trim = Some(reference);

    let mut remove = 0;
    if let Some(window) = self.window {
      let cutoff = reference.saturating_sub(window);
      remove = self.entries.partition_point(|e| e.timestamp < cutoff);
    }
    if let Some(count) = self.count {
      remove = remove.max(self.entries.len().saturating_sub(count));
    }
    if remove == 0 {
      return Vec::new();
    }

    let drained_cached = remove.min(self.series_valid);
    self.series.truncate(self.series_valid);
    self.series.drain_front(drained_cached);
    self.series_valid -= drained_cached;

    self.entries.drain(..remove).map(|e| (e.timestamp, e.message)).collect()
  }

  /// Columnar view, rebuilt only from the first row changed since the last call.
  pub fn materialize(&mut self) -> &Series {
    if self.series_valid < self.entries.len() || self.series.len() != self.entries.len() {
      self.series.truncate(self.series_valid);
      for entry in &self.entries[self.series_valid..] {
        self.series.push(entry);
      }
      self.series_valid = self.entries.len();
    }
    &self.series
  }

  /// Most recent message at or before `timestamp`.
  pub fn get(&self, timestamp: i64) -> Option<&Message> {
    let index = self.entries.partition_point(|e| e.timestamp <= timestamp);
    index.checked_sub(1).map(|i| &self.entries[i].message)
  }

  pub fn get_or<'a>(&'a self, timestamp: i64, default: &'a Message) -> &'a Message {
    self.get(timestamp).unwrap_or(default)
  }

  pub fn first(&self) -> Option<&Message> {
    self.entries.first().map(|e| &e.message)
  }

  pub fn last(&self) -> Option<&Message> {
    self.entries.last().map(|e| &e.message)
  }

  pub fn iter(&self) -> impl DoubleEndedIterator<Item = (i64, &Message)> {
    self.entries.iter().map(|e| (e.timestamp, &e.message))
  }

  pub fn timestamps(&self) -> impl DoubleEndedIterator<Item = i64> + '_ {
    self.entries.iter().map(|e| e.timestamp)
  }

  pub fn messages(&self) -> impl DoubleEndedIterator<Item = &Message> {
    self.entries.iter().map(|e| &e.message)
  }

  pub fn clear(&mut self) {
    self.entries.clear();
    self.series = Series::default();
    self.series_valid = 0;
    self.last_trim = None;
  }
}
