//! Target templates such as `"data.{name}"`.
//!
//! Placeholders name message fields (see [`Message::field`]); `{{` and `}}`
//! are literal braces. Templates are parsed once when a topic is registered
//! and rendered per message.

use std::fmt;

use serde_json::Value;
use thiserror::Error;

use crate::message::Message;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
  #[error("unclosed placeholder in {0:?}")]
  Unclosed(String),
  #[error("unmatched '}}' in {0:?}")]
  Unmatched(String),
  #[error("empty placeholder in {0:?}")]
  EmptyPlaceholder(String),
  #[error("message has no field {0:?}")]
  UnknownField(String),
  #[error("field {0:?} is not a scalar")]
  NotScalar(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
  Literal(String),
  Field(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
  raw: String,
  parts: Vec<Part>,
}

impl Template {
  pub fn parse(raw: &str) -> Result<Self, TemplateError> {
    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut chars = raw.chars().peekable();

    while let Some(c) = chars.next() {
      match c {
        '{' if chars.peek() == Some(&'{') => {
          chars.next();
          literal.push('{');
        }
        '}' if chars.peek() == Some(&'}') => {
          chars.next();
          literal.push('}');
        }
        '}' => return Err(TemplateError::Unmatched(raw.to_string())),
        '{' => {
          let mut field = String::new();
          loop {
            match chars.next() {
              Some('}') => break,
              Some(c) => field.push(c),
              None => return Err(TemplateError::Unclosed(raw.to_string())),
            }
          }
          let field = field.trim().to_string();
          if field.is_empty() {
            return Err(TemplateError::EmptyPlaceholder(raw.to_string()));
          }
          if !literal.is_empty() {
            parts.push(Part::Literal(std::mem::take(&mut literal)));
          }
          parts.push(Part::Field(field));
        }
        c => literal.push(c),
      }
    }

    if !literal.is_empty() {
      parts.push(Part::Literal(literal));
    }

    Ok(Self {
      raw: raw.to_string(),
      parts,
    })
  }

  pub fn as_str(&self) -> &str {
    &self.raw
  }

  pub fn is_empty(&self) -> bool {
    self.parts.is_empty()
  }

  pub fn has_placeholders(&self) -> bool {
    self.parts.iter().any(|p| matches!(p, Part::Field(_)))
  }

  pub fn render(&self, message: &Message) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(self.raw.len());
    for part in &self.parts {
      match part {
        Part::Literal(s) => out.push_str(s),
        Part::Field(path) => {
          let value = message
            .field(path)
            .ok_or_else(|| TemplateError::UnknownField(path.clone()))?;
          match value {
            Value::String(s) => out.push_str(&s),
            Value::Number(n) => out.push_str(&n.to_string()),
            Value::Bool(b) => out.push_str(if b { "true" } else { "false" }),
            Value::Null | Value::Array(_) | Value::Object(_) => return Err(TemplateError::NotScalar(path.clone())),
          }
        }
      }
    }
    Ok(out)
  }
}

impl fmt::Display for Template {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.raw)
  }
}
