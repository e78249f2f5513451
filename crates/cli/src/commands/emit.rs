//! Emit command: publish one message over the blocking transport

use anyhow::{Context, Result, bail};
use edgewire::Transport;
use edgewire_core::{Config, Message, TypeRegistry, time::now_nanos};
use ipc::Request;
use serde_json::Value;
use tracing::{debug, warn};

use super::parse_time;

/// Publish a single message
pub async fn cmd_emit(config: Config, type_name: &str, name: &str, value: &str, time: Option<&str>) -> Result<()> {
  if name.is_empty() {
    bail!("Message name must not be empty");
  }

  let tov = parse_time(time, now_nanos())?;
  let value = serde_json::from_str::<Value>(value).unwrap_or_else(|_| Value::String(value.to_string()));
  let mut message = Message::raw(type_name, name, tov, value);
  if let Some(source) = &config.transport.source {
    message = message.with_source(source);
  }

  let registry = TypeRegistry::with_builtins();
  if registry.contains(type_name) {
    registry.validate(&message).context("Message does not match its type")?;
  } else {
    warn!(message_type = type_name, "Unknown message type, sending unvalidated");
  }

  let transport_config = config.transport;
  let source = transport_config.source.clone();
  let hash = tokio::task::spawn_blocking(move || -> Result<String> {
    let mut transport = Transport::new(transport_config).context("Invalid transport configuration")?;
    transport.connect().context("Failed to connect")?;
    let request = Request::emit(vec![message]).with_source(source);
    let request = transport.submit(request).context("Failed to send message")?;
    let hash = request.hash()?;
    transport.close();
    Ok(hash)
  })
  .await
  .context("Emit task panicked")??;

  debug!(hash = %hash, "Message sent");
  println!("Sent {} ({})", name, hash);
  Ok(())
}
