//! Run command: the logging relay application

use std::time::Duration;

use anyhow::{Context as _, Result};
use edgewire::{Application, AsyncTransport, Context, ProcessError, Processor, Runner};
use edgewire_core::{AppConfig, Config, Message, time::format_nanos};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Processor that logs everything it accepts and emits nothing.
#[derive(Default)]
struct Relay {
  received: u64,
}

impl Processor for Relay {
  fn on_initialize(&mut self, config: &AppConfig) -> Result<(), ProcessError> {
    info!(
      inputs = config.inputs.len(),
      outputs = config.outputs.len(),
      topics = config.topics.len(),
      "Relay initialized"
    );
    Ok(())
  }

  fn process_data(&mut self, ctx: &mut Context<'_>, messages: &[Message]) -> Result<(), ProcessError> {
    for message in messages {
      self.received += 1;
      info!(
        asset = ctx.asset(),
        message_name = message.name(),
        message_type = message.type_name(),
        time_of_validity = %format_nanos(message.time_of_validity()),
        "Received"
      );
    }
    Ok(())
  }

  fn on_terminate(&mut self) -> Result<(), ProcessError> {
    info!(received = self.received, "Relay terminated");
    Ok(())
  }
}

/// Run the relay until ctrl-c
pub async fn cmd_run(config: Config, poll_ms: Option<u64>) -> Result<()> {
  let app = Application::new(Relay::default(), config.app).context("Invalid application configuration")?;
  let transport = AsyncTransport::new(config.transport).context("Invalid transport configuration")?;

  let cancel = CancellationToken::new();
  let cancel_for_signal = cancel.clone();
  tokio::spawn(async move {
    if let Err(e) = signal::ctrl_c().await {
      warn!("Failed to listen for ctrl-c: {}", e);
      return;
    }
    info!("Received ctrl-c, shutting down...");
    cancel_for_signal.cancel();
  });

  let mut runner = Runner::new(app, transport, cancel);
  if let Some(ms) = poll_ms {
    runner = runner.with_poll_interval(Some(Duration::from_millis(ms)));
  }

  let app = runner.run().await.context("Runner failed")?;
  for asset in app.assets() {
    if let Some(state) = app.state(asset) {
      info!(
        asset,
        inputs = state.input_count(),
        outputs = state.output_count(),
        "Asset summary"
      );
    }
  }

  Ok(())
}
