//! edgewire CLI - per-asset edge application runtime

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use edgewire_core::Config;
use std::path::PathBuf;

mod commands;
mod logging;

use commands::{cmd_config_path, cmd_config_show, cmd_emit, cmd_run, cmd_select};
use logging::{init_cli_logging, init_runner_logging};

#[derive(Parser)]
#[command(name = "edgewire")]
#[command(about = "Per-asset edge application runtime")]
#[command(after_help = "\
QUICK START:
  edgewire config show              # Print the effective configuration
  edgewire run --poll 1000          # Relay data, polling every second

SENDING AND READING DATA:
  edgewire emit --type raw.float32 --name temp --value 21.5
  edgewire select temp --start 2024-01-01T00:00:00Z --limit 10")]
struct Cli {
  /// Config file (default: $EDGEWIRE_CONFIG, then the user config)
  #[arg(long, global = true, value_name = "FILE")]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Commands,
}

/// Subcommands for `edgewire config`
#[derive(Subcommand)]
pub enum ConfigCommand {
  /// Show effective configuration
  Show,
  /// Print the user config path
  Path,
}

#[derive(Subcommand)]
enum Commands {
  /// Run the logging relay application until ctrl-c
  Run {
    /// Poll interval in milliseconds (overrides app.poll_interval)
    #[arg(long, value_name = "MS")]
    poll: Option<u64>,
  },
  /// Publish a single message
  Emit {
    /// Message type, e.g. raw.float32
    #[arg(long = "type", value_name = "TYPE")]
    type_name: String,
    /// Message name
    #[arg(long)]
    name: String,
    /// Value (parsed as JSON, falling back to text)
    #[arg(long)]
    value: String,
    /// Time of validity: nanoseconds or RFC 3339 (default: now)
    #[arg(long)]
    time: Option<String>,
  },
  /// Read stored messages back
  Select {
    /// Message names
    #[arg(required = true)]
    names: Vec<String>,
    /// Start of the range: nanoseconds or RFC 3339 (default: epoch)
    #[arg(long)]
    start: Option<String>,
    /// End of the range: nanoseconds or RFC 3339 (default: now)
    #[arg(long)]
    end: Option<String>,
    #[arg(short, long, default_value = "1000")]
    limit: usize,
    /// Output as JSON lines
    #[arg(long)]
    json: bool,
  },
  /// Configuration management
  Config {
    #[command(subcommand)]
    command: ConfigCommand,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  let cli = Cli::parse();
  let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;

  // File logging only for the long-running relay
  let _guard = match &cli.command {
    Commands::Run { .. } => init_runner_logging(&config.logging),
    _ => {
      init_cli_logging(&config.logging);
      None
    }
  };

  match cli.command {
    Commands::Run { poll } => cmd_run(config, poll).await,
    Commands::Emit {
      type_name,
      name,
      value,
      time,
    } => cmd_emit(config, &type_name, &name, &value, time.as_deref()).await,
    Commands::Select {
      names,
      start,
      end,
      limit,
      json,
    } => cmd_select(config, names, start.as_deref(), end.as_deref(), limit, json).await,
    Commands::Config { command } => match command {
      ConfigCommand::Show => cmd_config_show(&config, cli.config.as_deref()),
      ConfigCommand::Path => cmd_config_path(),
    },
  }
}
