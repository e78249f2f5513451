use std::sync::OnceLock;

use edgewire_core::{Message, time::now_nanos};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::IpcError;

pub const DEFAULT_SELECT_LIMIT: usize = 1000;

fn default_select_limit() -> usize {
  DEFAULT_SELECT_LIMIT
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
  Emit,
  Poll,
  Select,
}

impl RequestKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      RequestKind::Emit => "emit",
      RequestKind::Poll => "poll",
      RequestKind::Select => "select",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RequestBody {
  /// Publish messages to the counterpart.
  Emit { messages: Vec<Message> },
  /// Ask for the latest value of each name.
  Poll { names: Vec<String> },
  /// Read back history for names over `[start, end]` (ns).
  Select {
    names: Vec<String>,
    start: i64,
    end: i64,
    #[serde(default = "default_select_limit")]
    limit: usize,
  },
}

impl RequestBody {
  pub fn kind(&self) -> RequestKind {
    match self {
      RequestBody::Emit { .. } => RequestKind::Emit,
      RequestBody::Poll { .. } => RequestKind::Poll,
      RequestBody::Select { .. } => RequestKind::Select,
    }
  }
}

/// Outgoing request envelope.
///
/// The encoded bytes are produced once and memoized, so the correlation hash
/// is stable for the lifetime of the value. A decoded request keeps the bytes
/// it was decoded from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
  #[serde(flatten)]
  body: RequestBody,
  time_of_validity: i64,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  source: Option<String>,
  #[serde(skip)]
  encoded: OnceLock<Vec<u8>>,
}

impl PartialEq for Request {
  fn eq(&self, other: &Self) -> bool {
    self.body == other.body && self.time_of_validity == other.time_of_validity && self.source == other.source
  }
}

impl Request {
  pub fn new(body: RequestBody) -> Self {
    Self {
      body,
      time_of_validity: now_nanos(),
      source: None,
      encoded: OnceLock::new(),
    }
  }

  pub fn emit(messages: Vec<Message>) -> Self {
    Self::new(RequestBody::Emit { messages })
  }

  pub fn poll(names: Vec<String>) -> Self {
    Self::new(RequestBody::Poll { names })
  }

  pub fn select(names: Vec<String>, start: i64, end: i64, limit: usize) -> Self {
    Self::new(RequestBody::Select {
      names,
      start,
      end,
      limit,
    })
  }

  pub fn with_time_of_validity(mut self, time_of_validity: i64) -> Self {
    self.time_of_validity = time_of_validity;
    self.encoded = OnceLock::new();
    self
  }

  pub fn with_source(mut self, source: Option<String>) -> Self {
    self.source = source;
    self.encoded = OnceLock::new();
    self
  }

  pub fn body(&self) -> &RequestBody {
    &self.body
  }

  pub fn kind(&self) -> RequestKind {
    self.body.kind()
  }

  pub fn time_of_validity(&self) -> i64 {
    self.time_of_validity
  }

  pub fn source(&self) -> Option<&str> {
    self.source.as_deref()
  }

  /// Encoded bytes. Deterministic and computed at most once.
  pub fn encode(&self) -> Result<&[u8], IpcError> {
    if let Some(bytes) = self.encoded.get() {
      return Ok(bytes);
    }
    let bytes = serde_json::to_vec(self)?;
    Ok(self.encoded.get_or_init(|| bytes))
  }

  pub fn decode(bytes: &[u8]) -> Result<Self, IpcError> {
    let request: Self = serde_json::from_slice(bytes)?;
    let _ = request.encoded.set(bytes.to_vec());
    Ok(request)
  }

  /// Correlation hash: first 16 hex chars of the SHA-256 of the encoded bytes.
  pub fn hash(&self) -> Result<String, IpcError> {
    Ok(content_hash(self.encode()?))
  }
}

pub fn content_hash(bytes: &[u8]) -> String {
  let digest = Sha256::digest(bytes);
  hex::encode(&digest[..8])
}

/// Incoming response envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
  #[serde(rename = "type")]
  type_name: String,
  time_of_validity: i64,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  source: Option<String>,
  /// Hash of the request this answers; absent for unsolicited data.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  hash: Option<String>,
  #[serde(default)]
  messages: Vec<Message>,
}

impl Response {
  /// Unsolicited data pushed by the counterpart.
  pub fn data(messages: Vec<Message>) -> Self {
    Self {
      type_name: "data".to_string(),
      time_of_validity: now_nanos(),
      source: None,
      hash: None,
      messages,
    }
  }

  /// Answer to `request`, echoing its hash.
  pub fn reply(request: &Request, messages: Vec<Message>) -> Result<Self, IpcError> {
    Ok(Self {
      type_name: request.kind().as_str().to_string(),
      time_of_validity: now_nanos(),
      source: None,
      hash: Some(request.hash()?),
      messages,
    })
  }

  pub fn with_source(mut self, source: impl Into<String>) -> Self {
    self.source = Some(source.into());
    self
  }

  pub fn with_time_of_validity(mut self, time_of_validity: i64) -> Self {
    self.time_of_validity = time_of_validity;
    self
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

  pub fn hash(&self) -> Option<&str> {
    self.hash.as_deref()
  }

  pub fn messages(&self) -> &[Message] {
    &self.messages
  }

  pub fn into_messages(self) -> Vec<Message> {
    self.messages
  }

  pub fn encode(&self) -> Result<Vec<u8>, IpcError> {
    Ok(serde_json::to_vec(self)?)
  }

  pub fn decode(bytes: &[u8]) -> Result<Self, IpcError> {
    Ok(serde_json::from_slice(bytes)?)
  }

  pub fn answers(&self, request: &Request) -> bool {
    match (&self.hash, request.hash()) {
      (Some(hash), Ok(expected)) => *hash == expected,
      _ => false,
    }
  }

  /// Check that this response answers `request`.
  pub fn correlate(&self, request: &Request) -> Result<(), IpcError> {
    let expected = request.hash()?;
    match &self.hash {
      Some(actual) if *actual == expected => Ok(()),
      actual => Err(IpcError::HashMismatch {
        expected,
        actual: actual.clone(),
      }),
    }
  }
}
