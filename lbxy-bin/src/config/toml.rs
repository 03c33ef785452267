use crate::error::anyhow;
use serde::Deserialize;
use std::fs;

/// Configuration file mirroring the CLI flags. Every field is optional; CLI flags
/// take precedence over file values.
#[derive(Deserialize, Debug, Default, PartialEq, Eq, Clone)]
pub struct ConfigToml {
  pub listen_port: Option<u16>,
  pub listen_ipv6: Option<bool>,
  pub max_clients: Option<u32>,
  pub upstreams: Option<Vec<String>>,
  pub balance_policy: Option<String>,
}

impl ConfigToml {
  pub fn new(config_file: &str) -> std::result::Result<Self, anyhow::Error> {
    let config_str = fs::read_to_string(config_file)?;

    toml::from_str(&config_str).map_err(|e| anyhow!(e))
  }
}
