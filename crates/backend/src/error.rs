use edgewire_core::{ConfigError, SchemaError, TopicError};
use ipc::IpcError;
use thiserror::Error;

use crate::buffer::BufferError;

#[derive(Debug, Error)]
pub enum AppError {
  #[error("Application is not initialized")]
  NotInitialized,

  #[error("Application has terminated")]
  Terminated,

  #[error(transparent)]
  Config(#[from] ConfigError),

  #[error(transparent)]
  Topic(#[from] TopicError),

  #[error(transparent)]
  Schema(#[from] SchemaError),

  #[error("Unknown message {0:?}: not a declared input or output and no type given")]
  UnknownMessage(String),

  #[error("Message name is empty")]
  EmptyName,

  #[error("Timer {0:?} already exists")]
  DuplicateTimer(String),

  #[error("Timer period must be positive")]
  InvalidPeriod,
}

/// Error returned by user processing code and timer callbacks.
///
/// These are logged by the processing pass and never abort it.
#[derive(Debug, Error)]
pub enum ProcessError {
  #[error("{0}")]
  Failed(String),

  #[error(transparent)]
  App(#[from] AppError),

  #[error(transparent)]
  Buffer(#[from] BufferError),

  #[error(transparent)]
  Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl ProcessError {
  pub fn failed(message: impl Into<String>) -> Self {
    ProcessError::Failed(message.into())
  }
}

pub type CallbackError = ProcessError;

#[derive(Debug, Error)]
pub enum TransportError {
  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),

  #[error(transparent)]
  Ipc(#[from] IpcError),

  #[error("Transport is not connected")]
  NotConnected,

  #[error("Connection closed by peer")]
  Closed,

  #[error("Frame of {size} bytes exceeds limit of {max}")]
  FrameTooLarge { size: usize, max: usize },
}

#[derive(Debug, Error)]
pub enum RunnerError {
  #[error(transparent)]
  App(#[from] AppError),

  #[error(transparent)]
  Transport(#[from] TransportError),
}
