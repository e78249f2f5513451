//! Config commands

use std::path::Path;

use anyhow::{Context, Result};
use edgewire_core::{Config, config::CONFIG_ENV};

/// Show the effective configuration and where it came from
pub fn cmd_config_show(config: &Config, explicit: Option<&Path>) -> Result<()> {
  let user_config = Config::user_config_path();

  if let Some(path) = explicit {
    println!("Using config: {:?}", path);
  } else if let Ok(path) = std::env::var(CONFIG_ENV) {
    println!("Using config from ${}: {:?}", CONFIG_ENV, path);
  } else if let Some(ref user_path) = user_config
    && user_path.exists()
  {
    println!("Using user config: {:?}", user_path);
  } else {
    println!("Using default configuration (no config file found)");
  }
  println!();

  let toml_str = config.to_toml().context("Failed to render configuration")?;
  println!("{}", toml_str);

  Ok(())
}

/// Print the user config path
pub fn cmd_config_path() -> Result<()> {
  let path = Config::user_config_path().context("No config directory on this platform")?;
  println!("{}", path.display());
  Ok(())
}
