//! CLI command implementations

mod config;
mod emit;
mod run;
mod select;

pub use config::{cmd_config_path, cmd_config_show};
pub use emit::cmd_emit;
pub use run::cmd_run;
pub use select::cmd_select;

use anyhow::{Result, anyhow};
use edgewire_core::time::parse_timestamp;

/// Parse a CLI time argument, falling back to `default` when absent.
fn parse_time(raw: Option<&str>, default: i64) -> Result<i64> {
  match raw {
    Some(raw) => parse_timestamp(raw).ok_or_else(|| anyhow!("Invalid time {raw:?}: expected nanoseconds or RFC 3339")),
    None => Ok(default),
  }
}
