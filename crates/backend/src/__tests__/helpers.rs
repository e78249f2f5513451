//! Test helpers for application and transport scenarios.
//!
//! `Recorder` is a processor that keeps everything it is handed and can be
//! told to emit in response. Transport helpers bind local listeners that play
//! the data counterpart.

use std::time::Duration;

use edgewire_core::{AppConfig, Compression, Message, RuleSet, TransportConfig};
use ipc::FrameCodec;
use tokio::net::TcpListener;

use crate::{
  app::{Application, Context, Processor},
  clock::ManualClock,
  error::ProcessError,
  state::Callback,
};

pub const SEC: i64 = 1_000_000_000;
pub const START: i64 = 1_000 * SEC;
pub const TOPIC: &str = "plant";
pub const MAX_FRAME: usize = 1024 * 1024;

type Reaction = Box<dyn FnMut(&mut Context<'_>, &Message) -> Result<(), ProcessError> + Send>;

/// Processor that records accepted messages and pass count.
#[derive(Default)]
pub struct Recorder {
  pub rules: RuleSet,
  pub seen: Vec<Message>,
  pub passes: usize,
  pub initialized: bool,
  pub terminated: bool,
  reaction: Option<Reaction>,
}

impl Recorder {
  pub fn new() -> Self {
    Self::default()
  }

  /// Run `reaction` for every accepted message.
  pub fn reacting(
    mut self,
    reaction: impl FnMut(&mut Context<'_>, &Message) -> Result<(), ProcessError> + Send + 'static,
  ) -> Self {
    self.reaction = Some(Box::new(reaction));
    self
  }

  /// Emit an `out` text message for every accepted message, at its time of validity.
  pub fn echoing() -> Self {
    Self::new().reacting(|ctx, message| {
      ctx.emit(Message::raw("raw.text", "out", message.time_of_validity(), message.name()));
      Ok(())
    })
  }

  pub fn names(&self) -> Vec<&str> {
    self.seen.iter().map(Message::name).collect()
  }
}

impl Processor for Recorder {
  fn rules(&self) -> RuleSet {
    self.rules.clone()
  }

  fn on_initialize(&mut self, _config: &AppConfig) -> Result<(), ProcessError> {
    self.initialized = true;
    Ok(())
  }

  fn process_data(&mut self, ctx: &mut Context<'_>, messages: &[Message]) -> Result<(), ProcessError> {
    self.seen.extend_from_slice(messages);
    if let Some(reaction) = self.reaction.as_mut() {
      for message in messages {
        reaction(ctx, message)?;
      }
    }
    Ok(())
  }

  fn process(&mut self, _ctx: &mut Context<'_>) -> Result<(), ProcessError> {
    self.passes += 1;
    Ok(())
  }

  fn on_terminate(&mut self) -> Result<(), ProcessError> {
    self.terminated = true;
    Ok(())
  }
}

/// Initialized application on a manual clock set to [`START`].
pub fn app_with(config: AppConfig, processor: Recorder) -> (Application<Recorder, ManualClock>, ManualClock) {
  let clock = ManualClock::new(START);
  let mut app = Application::with_clock(processor, config, clock.clone()).expect("build application");
  app.on_initialize(Vec::new()).expect("initialize");
  (app, clock)
}

pub fn app() -> (Application<Recorder, ManualClock>, ManualClock) {
  app_with(AppConfig::default(), Recorder::new())
}

pub fn callback(f: impl FnMut(&mut Context<'_>) -> Result<(), ProcessError> + Send + 'static) -> Callback {
  Box::new(f)
}

pub fn temp(time_of_validity: i64, value: f64) -> Message {
  Message::raw("raw.float32", "temp", time_of_validity, value)
}

/// Listeners standing in for the counterpart's publish and subscribe ends.
pub struct Counterpart {
  pub requests: TcpListener,
  pub responses: TcpListener,
  pub config: TransportConfig,
}

impl Counterpart {
  pub async fn bind(compression: Compression) -> Self {
    let requests = TcpListener::bind("127.0.0.1:0").await.expect("bind request listener");
    let responses = TcpListener::bind("127.0.0.1:0").await.expect("bind response listener");
    let config = TransportConfig {
      publish_addr: requests.local_addr().expect("request addr").to_string(),
      subscribe_addr: responses.local_addr().expect("response addr").to_string(),
      topic: TOPIC.to_string(),
      compression,
      receive_timeout_ms: 2_000,
      max_frame_bytes: MAX_FRAME,
      source: Some("test".to_string()),
    };
    Self {
      requests,
      responses,
      config,
    }
  }

  pub fn codec(&self) -> FrameCodec {
    FrameCodec::new(TOPIC, self.config.compression, MAX_FRAME).expect("codec")
  }
}

pub const WAIT: Duration = Duration::from_secs(5);
