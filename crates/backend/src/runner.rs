//! Async driver tying an [`Application`] to an [`AsyncTransport`].
//!
//! Startup:
//! 1. Connect the transport and initialize the application
//! 2. Seed last outputs and pre-fill inputs through `Select` requests
//!
//! Then loop until the `CancellationToken` fires: received responses go to
//! `on_data`, the poll interval drives `on_poll`, and whatever the application
//! delivers is published as an `Emit` request.

use std::time::Duration;

use edgewire_core::Message;
use ipc::Request;
use tokio::time::{Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
  app::{Application, PRE_FILL_LIMIT, Processor},
  clock::{Clock, SystemClock},
  error::{RunnerError, TransportError},
  transport::AsyncTransport,
};

pub struct Runner<P, C = SystemClock> {
  app: Application<P, C>,
  transport: AsyncTransport,
  poll_interval: Option<Duration>,
  request_timeout: Duration,
  cancel: CancellationToken,
}

impl<P: Processor, C: Clock> Runner<P, C> {
  pub fn new(app: Application<P, C>, transport: AsyncTransport, cancel: CancellationToken) -> Self {
    let poll_interval = app
      .config()
      .poll_interval
      .filter(|secs| *secs > 0.0)
      .map(Duration::from_secs_f64);
    let request_timeout = Duration::from_millis(transport.config().receive_timeout_ms);

    Self {
      app,
      transport,
      poll_interval,
      request_timeout,
      cancel,
    }
  }

  /// Override the configured poll interval. `None` disables polling.
  pub fn with_poll_interval(mut self, poll_interval: Option<Duration>) -> Self {
    self.poll_interval = poll_interval.filter(|interval| !interval.is_zero());
    self
  }

  pub fn app(&self) -> &Application<P, C> {
    &self.app
  }

  /// Run until cancelled or the connection closes. Returns the application
  /// after termination.
  pub async fn run(mut self) -> Result<Application<P, C>, RunnerError> {
    self.transport.connect().await?;
    self.app.on_initialize(Vec::new())?;
    self.load_history().await?;

    let mut ticker = self.poll_interval.map(|period| {
      let mut ticker = tokio::time::interval(period);
      ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
      ticker
    });

    info!(poll_interval = ?self.poll_interval, "Runner started");

    loop {
      tokio::select! {
        biased;

        _ = self.cancel.cancelled() => {
          info!("Runner shutting down (cancelled)");
          break;
        }

        _ = tick(&mut ticker) => {
          match self.app.on_poll() {
            Ok(delivered) => self.publish(delivered),
            Err(e) => error!(error = %e, "Poll failed"),
          }
        }

        result = self.transport.receive(None) => {
          match result {
            Ok(Some(response)) => {
              debug!(count = response.messages().len(), "Received data");
              match self.app.on_data(response.into_messages()) {
                Ok(delivered) => self.publish(delivered),
                Err(e) => error!(error = %e, "Processing failed"),
              }
            }
            Ok(None) => {}
            Err(TransportError::Closed) => {
              warn!("Runner shutting down (connection closed)");
              break;
            }
            Err(e) => error!(error = %e, "Receive failed"),
          }
        }
      }
    }

    self.app.on_terminate();
    self.transport.shutdown().await;
    info!("Runner stopped");
    Ok(self.app)
  }

  /// Seed last outputs and pre-fill inputs before the first pass.
  ///
  /// One `Select` per name, so each name gets its own limit.
  async fn load_history(&mut self) -> Result<(), RunnerError> {
    let end = self.app.startup_time();

    let mut seeds = Vec::new();
    for name in self.app.last_output_names() {
      seeds.extend(self.select(name, 0, end, 1).await?);
    }
    if !seeds.is_empty() {
      debug!(count = seeds.len(), "Seeding last outputs");
      self.app.seed_last_outputs(seeds);
    }

    if let Some((start, end)) = self.app.pre_fill_window() {
      let mut history = Vec::new();
      for name in self.app.input_names() {
        history.extend(self.select(name, start, end, PRE_FILL_LIMIT).await?);
      }
      if !history.is_empty() {
        info!(count = history.len(), window_ns = end - start, "Pre-filling inputs");
        self.app.prefill(history);
      }
    }
    Ok(())
  }

  async fn select(&mut self, name: String, start: i64, end: i64, limit: usize) -> Result<Vec<Message>, RunnerError> {
    let request = Request::select(vec![name.clone()], start, end, limit).with_source(self.transport.config().source.clone());
    match self.transport.request(request, self.request_timeout).await? {
      Some(response) => Ok(response.into_messages()),
      None => {
        warn!(name = %name, timeout_ms = self.request_timeout.as_millis() as u64, "Select timed out");
        Ok(Vec::new())
      }
    }
  }

  fn publish(&self, delivered: Vec<Message>) {
    if delivered.is_empty() {
      return;
    }
    let count = delivered.len();
    let request = Request::emit(delivered).with_source(self.transport.config().source.clone());
    match self.transport.submit(request) {
      Ok(_) => debug!(count, "Published emissions"),
      Err(e) => error!(count, error = %e, "Failed to publish emissions"),
    }
  }
}

async fn tick(ticker: &mut Option<Interval>) {
  match ticker {
    Some(ticker) => {
      ticker.tick().await;
    }
    None => std::future::pending().await,
  }
}
