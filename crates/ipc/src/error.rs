use thiserror::Error;

#[derive(Debug, Error)]
pub enum IpcError {
  #[error("Serialization error: {0}")]
  Serialization(#[from] serde_json::Error),

  #[error("Frame has no topic prefix")]
  MissingTopic,

  #[error("Invalid topic {0:?}")]
  InvalidTopic(String),

  #[error("Compression error: {0}")]
  Compression(#[source] std::io::Error),

  #[error("Frame of {size} bytes exceeds limit of {max}")]
  FrameTooLarge { size: usize, max: usize },

  #[error("Response hash {actual:?} does not match request hash {expected}")]
  HashMismatch { expected: String, actual: Option<String> },
}
