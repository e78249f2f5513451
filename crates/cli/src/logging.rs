//! Logging setup for the CLI and the runner

use edgewire_core::LoggingConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

const LOG_FILE: &str = "edgewire.log";

/// Parse log level from config string
fn parse_log_level(level: &str) -> tracing::Level {
  match level.to_lowercase().as_str() {
    "off" | "error" => tracing::Level::ERROR,
    "warn" => tracing::Level::WARN,
    "info" => tracing::Level::INFO,
    "debug" => tracing::Level::DEBUG,
    "trace" => tracing::Level::TRACE,
    _ => tracing::Level::INFO,
  }
}

fn env_filter(level: &str) -> EnvFilter {
  EnvFilter::builder()
    .with_default_directive(parse_log_level(level).into())
    .from_env_lossy()
}

/// Initialize logging for one-shot commands (console only, stderr)
pub fn init_cli_logging(config: &LoggingConfig) {
  tracing_subscriber::fmt()
    .with_env_filter(env_filter(&config.log_level))
    .with_writer(std::io::stderr)
    .init();
}

/// Initialize logging for the runner.
///
/// Logs to the console unless `log_dir` is set, in which case logs go to a
/// rolling file there (no ANSI).
///
/// Returns the guard that must be kept alive for the duration of the program
pub fn init_runner_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
  let Some(log_dir) = config.log_dir.as_ref() else {
    tracing_subscriber::fmt()
      .with_env_filter(env_filter(&config.log_level))
      .with_target(true)
      .with_ansi(true)
      .init();
    return None;
  };

  if std::fs::create_dir_all(log_dir).is_err() {
    // Fall back to console-only logging
    init_cli_logging(config);
    return None;
  }

  let file_appender = match config.log_rotation.as_str() {
    "hourly" => tracing_appender::rolling::hourly(log_dir, LOG_FILE),
    "never" => tracing_appender::rolling::never(log_dir, LOG_FILE),
    _ => tracing_appender::rolling::daily(log_dir, LOG_FILE),
  };

  let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

  tracing_subscriber::fmt()
    .with_env_filter(env_filter(&config.log_level))
    .with_target(true)
    .with_ansi(false)
    .with_writer(file_writer)
    .init();

  Some(guard)
}
