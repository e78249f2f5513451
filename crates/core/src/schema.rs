//! Message type registry.
//!
//! Maps a type name (e.g. `raw.float32`) to the payload fields a message of
//! that type carries. Messages are checked against the registry when they are
//! built by application code, before they are routed or emitted.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::message::Message;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
  #[error("unknown message type {0:?}")]
  UnknownType(String),
  #[error("{type_name}: missing required field {field:?}")]
  MissingField { type_name: String, field: String },
  #[error("{type_name}: unexpected field {field:?}")]
  UnexpectedField { type_name: String, field: String },
  #[error("{type_name}: field {field:?} expected {expected}, got {actual}")]
  WrongKind {
    type_name: String,
    field: String,
    expected: FieldKind,
    actual: &'static str,
  },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
  Float,
  Integer,
  Boolean,
  Text,
  Object,
  Array,
  Any,
}

impl FieldKind {
  fn accepts(self, value: &Value) -> bool {
    match self {
      FieldKind::Float => value.is_number(),
      FieldKind::Integer => value.is_i64() || value.is_u64(),
      FieldKind::Boolean => value.is_boolean(),
      FieldKind::Text => value.is_string(),
      FieldKind::Object => value.is_object(),
      FieldKind::Array => value.is_array(),
      FieldKind::Any => true,
    }
  }
}

impl std::fmt::Display for FieldKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let name = match self {
      FieldKind::Float => "float",
      FieldKind::Integer => "integer",
      FieldKind::Boolean => "boolean",
      FieldKind::Text => "text",
      FieldKind::Object => "object",
      FieldKind::Array => "array",
      FieldKind::Any => "any",
    };
    f.write_str(name)
  }
}

fn value_kind(value: &Value) -> &'static str {
  match value {
    Value::Null => "null",
    Value::Bool(_) => "boolean",
    Value::Number(n) if n.is_f64() => "float",
    Value::Number(_) => "integer",
    Value::String(_) => "text",
    Value::Array(_) => "array",
    Value::Object(_) => "object",
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
  pub kind: FieldKind,
  #[serde(default = "default_required")]
  pub required: bool,
}

fn default_required() -> bool {
  true
}

impl FieldSpec {
  pub fn required(kind: FieldKind) -> Self {
    Self { kind, required: true }
  }

  pub fn optional(kind: FieldKind) -> Self {
    Self { kind, required: false }
  }
}

/// Field layout for one message type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
  #[serde(default)]
  pub fields: BTreeMap<String, FieldSpec>,
  /// Accept payload fields not listed in `fields`.
  #[serde(default)]
  pub open: bool,
}

impl Schema {
  pub fn field(mut self, name: impl Into<String>, spec: FieldSpec) -> Self {
    self.fields.insert(name.into(), spec);
    self
  }

  /// A schema with a single required `value` field.
  pub fn scalar(kind: FieldKind) -> Self {
    Self::default().field("value", FieldSpec::required(kind))
  }

  pub fn validate(&self, type_name: &str, message: &Message) -> Result<(), SchemaError> {
    let payload = message.payload();

    for (name, spec) in &self.fields {
      match payload.get(name) {
        None | Some(Value::Null) if spec.required => {
          return Err(SchemaError::MissingField {
            type_name: type_name.to_string(),
            field: name.clone(),
          });
        }
        None | Some(Value::Null) => {}
        Some(value) if !spec.kind.accepts(value) => {
          return Err(SchemaError::WrongKind {
            type_name: type_name.to_string(),
            field: name.clone(),
            expected: spec.kind,
            actual: value_kind(value),
          });
        }
        Some(_) => {}
      }
    }

    if !self.open
      && let Some(extra) = payload.keys().find(|k| !self.fields.contains_key(*k))
    {
      return Err(SchemaError::UnexpectedField {
        type_name: type_name.to_string(),
        field: extra.clone(),
      });
    }

    Ok(())
  }
}

/// Registry of known message types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeRegistry {
  schemas: BTreeMap<String, Schema>,
}

impl Default for TypeRegistry {
  fn default() -> Self {
    Self::with_builtins()
  }
}

impl TypeRegistry {
  pub fn empty() -> Self {
    Self { schemas: BTreeMap::new() }
  }

  /// Registry preloaded with the `raw.*` scalar types.
  pub fn with_builtins() -> Self {
    let mut registry = Self::empty();
    for (name, kind) in [
      ("raw.float32", FieldKind::Float),
      ("raw.float64", FieldKind::Float),
      ("raw.int32", FieldKind::Integer),
      ("raw.int64", FieldKind::Integer),
      ("raw.uint32", FieldKind::Integer),
      ("raw.uint64", FieldKind::Integer),
      ("raw.boolean", FieldKind::Boolean),
      ("raw.text", FieldKind::Text),
    ] {
      registry.register(name, Schema::scalar(kind));
    }
    registry
  }

  /// Register or replace a type.
  pub fn register(&mut self, type_name: impl Into<String>, schema: Schema) {
    self.schemas.insert(type_name.into(), schema);
  }

  pub fn get(&self, type_name: &str) -> Option<&Schema> {
    self.schemas.get(type_name)
  }

  pub fn contains(&self, type_name: &str) -> bool {
    self.schemas.contains_key(type_name)
  }

  pub fn type_names(&self) -> impl Iterator<Item = &str> {
    self.schemas.keys().map(String::as_str)
  }

  pub fn validate(&self, message: &Message) -> Result<(), SchemaError> {
    let schema = self
      .schemas
      .get(message.type_name())
      .ok_or_else(|| SchemaError::UnknownType(message.type_name().to_string()))?;
    schema.validate(message.type_name(), message)
  }
}
