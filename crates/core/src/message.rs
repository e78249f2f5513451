//! Messages: immutable, typed, timestamped units of data.
//!
//! A message is identified by its `(name, type)` pair and ordered by its
//! `time_of_validity` (nanoseconds since the Unix epoch). The payload is a
//! generic key-value map; per-type field layouts live in [`crate::schema`].

use std::{cmp::Ordering, collections::BTreeMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Message payload fields, kept sorted so encodings are deterministic.
pub type Payload = BTreeMap<String, Value>;

/// Primary key of a message stream: `(name, type)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageKey {
  pub name: String,
  #[serde(rename = "type")]
  pub type_name: String,
}

impl MessageKey {
  pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      type_name: type_name.into(),
    }
  }
}

/// Immutable data unit. Construct with [`Message::new`] and the `with_*`
/// builders; there are no setters once the value is shared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
  name: String,
  #[serde(rename = "type")]
  type_name: String,
  time_of_validity: i64,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  source: Option<String>,
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  payload: Payload,
}

impl Message {
  pub fn new(type_name: impl Into<String>, name: impl Into<String>, time_of_validity: i64) -> Self {
    Self {
      name: name.into(),
      type_name: type_name.into(),
      time_of_validity,
      source: None,
      payload: Payload::new(),
    }
  }

  /// Shorthand for the `raw.*` types that carry a single `value` field.
  pub fn raw(type_name: impl Into<String>, name: impl Into<String>, time_of_validity: i64, value: impl Into<Value>) -> Self {
    Self::new(type_name, name, time_of_validity).with_field("value", value)
  }

  pub fn with_source(mut self, source: impl Into<String>) -> Self {
    self.source = Some(source.into());
    self
  }

  pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
    self.payload.insert(key.into(), value.into());
    self
  }

  pub fn with_payload(mut self, payload: Payload) -> Self {
    self.payload = payload;
    self
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn type_name(&self) -> &str {
    &self.type_name
  }

  pub fn time_of_validity(&self) -> i64 {
    self.time_of_validity
  }

  pub fn source(&self) -> Option<&str> {
    self.source.as_deref()
  }

  pub fn payload(&self) -> &Payload {
    &self.payload
  }

  pub fn key(&self) -> MessageKey {
    MessageKey::new(&self.name, &self.type_name)
  }

  /// The string topic patterns are matched against: `"{type}.{name}"`.
  pub fn subject(&self) -> String {
    format!("{}.{}", self.type_name, self.name)
  }

  /// Look up a field by dotted path.
  ///
  /// Payload fields shadow header fields, so a payload `name` wins over the
  /// message name. Nested objects and arrays are walked segment by segment.
  pub fn field(&self, path: &str) -> Option<Value> {
    let mut segments = path.split('.');
    let head = segments.next()?;

    if let Some(root) = self.payload.get(head) {
      let mut current = root;
      for segment in segments {
        current = match current {
          Value::Object(map) => map.get(segment)?,
          Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
          _ => return None,
        };
      }
      return Some(current.clone());
    }

    if segments.next().is_some() {
      return None;
    }

    match head {
      "name" => Some(Value::String(self.name.clone())),
      "type" => Some(Value::String(self.type_name.clone())),
      "time_of_validity" => Some(Value::from(self.time_of_validity)),
      "source" => self.source.clone().map(Value::String),
      _ => None,
    }
  }

  /// Order by time of validity, then by key for a total order.
  pub fn chronological(a: &Message, b: &Message) -> Ordering {
    a.time_of_validity
      .cmp(&b.time_of_validity)
      .then_with(|| a.type_name.cmp(&b.type_name))
      .then_with(|| a.name.cmp(&b.name))
  }
}
