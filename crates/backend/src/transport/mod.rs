//! Publish/subscribe transport to the data counterpart.
//!
//! Each connection owns two TCP streams: requests are published on one,
//! responses arrive on the other. Every frame on the wire is a big-endian
//! `u32` length followed by a `topic|payload` frame from [`ipc::FrameCodec`].
//!
//! Two variants share that wire format:
//!
//! - [`Transport`] blocks the calling thread on every send and receive
//! - [`AsyncTransport`] queues sends onto a writer task and receives with a
//!   cancellable timeout

mod blocking;
mod correlator;
mod nonblocking;

pub use blocking::Transport;
pub use correlator::Correlator;
pub use nonblocking::AsyncTransport;

use edgewire_core::{TransportConfig, Message};
use ipc::{FrameCodec, Response};
use tracing::trace;

use crate::{error::TransportError, rules::SharedRules, state::State};

/// Length prefix size on the wire.
pub(crate) const LENGTH_PREFIX: usize = 4;

pub(crate) fn codec(config: &TransportConfig) -> Result<FrameCodec, TransportError> {
  Ok(FrameCodec::new(
    config.topic.clone(),
    config.compression,
    config.max_frame_bytes,
  )?)
}

/// State kept up to date with every received response.
#[derive(Debug, Default)]
pub struct Aggregate {
  state: State,
  rules: SharedRules,
}

impl Aggregate {
  pub fn new(rules: SharedRules) -> Self {
    Self {
      state: State::new(),
      rules,
    }
  }

  pub fn state(&self) -> &State {
    &self.state
  }

  pub fn state_mut(&mut self) -> &mut State {
    &mut self.state
  }

  pub(crate) fn feed(&mut self, response: &Response) {
    let messages: Vec<Message> = response.messages().to_vec();
    if messages.is_empty() {
      return;
    }
    let accepted = self.state.route(messages, &self.rules.snapshot(), true);
    if let Some(latest) = accepted.iter().map(Message::time_of_validity).max()
      && latest > self.state.last_process_time()
    {
      self.state.set_last_process_time(latest);
    }
    trace!(accepted = accepted.len(), "Aggregated response");
  }
}
