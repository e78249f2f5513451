//! Select command: read stored messages back

use std::time::Duration;

use anyhow::{Context, Result, bail};
use edgewire::AsyncTransport;
use edgewire_core::{Config, time::{format_nanos, now_nanos}};
use ipc::Request;

use super::parse_time;

/// Read messages for `names` in `[start, end]`
pub async fn cmd_select(
  config: Config,
  names: Vec<String>,
  start: Option<&str>,
  end: Option<&str>,
  limit: usize,
  json: bool,
) -> Result<()> {
  let start = parse_time(start, 0)?;
  let end = parse_time(end, now_nanos())?;
  if start > end {
    bail!("Start {} is after end {}", format_nanos(start), format_nanos(end));
  }

  let timeout = Duration::from_millis(config.transport.receive_timeout_ms);
  let source = config.transport.source.clone();
  let mut transport = AsyncTransport::new(config.transport).context("Invalid transport configuration")?;
  transport.connect().await.context("Failed to connect")?;

  let request = Request::select(names, start, end, limit).with_source(source);
  let response = transport.request(request, timeout).await.context("Select failed")?;
  transport.shutdown().await;

  let Some(response) = response else {
    bail!("No response within {} ms", timeout.as_millis());
  };

  if json {
    for message in response.messages() {
      println!("{}", serde_json::to_string(message)?);
    }
    return Ok(());
  }

  if response.messages().is_empty() {
    println!("No messages found");
    return Ok(());
  }

  for message in response.messages() {
    println!(
      "{}  {:<24} {:<14} {}",
      format_nanos(message.time_of_validity()),
      message.name(),
      message.type_name(),
      serde_json::to_string(message.payload())?
    );
  }
  println!();
  println!("{} message(s)", response.messages().len());

  Ok(())
}
