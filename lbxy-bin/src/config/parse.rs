use super::toml::ConfigToml;
use crate::{
  constants::*,
  error::ensure,
  log::*,
};
use clap::{Arg, ArgAction};
use lbxy_lib::{BackendConfig, ProxyConfig};
use std::net::SocketAddr;

/// Parsed options
pub struct Opts {
  pub config_file_path: Option<String>,
  pub listen_port: Option<u16>,
  pub listen_ipv6: bool,
  pub upstreams: Option<String>,
  pub balance_policy: Option<String>,
}

/// Parse arg values passed from cli
pub fn parse_opts() -> Result<Opts, anyhow::Error> {
  let _ = include_str!("../../Cargo.toml");
  let options = clap::command!()
    .arg(
      Arg::new("config_file")
        .long("config")
        .short('c')
        .value_name("FILE")
        .help("Configuration file path like ./config.toml"),
    )
    .arg(
      Arg::new("port")
        .long("port")
        .short('p')
        .value_name("PORT")
        .value_parser(clap::value_parser!(u16))
        .help("Port to listen on for plaintext http"),
    )
    .arg(
      Arg::new("ipv6")
        .long("ipv6")
        .action(ArgAction::SetTrue)
        .help("Listen on IPv6 in addition to IPv4"),
    )
    .arg(
      Arg::new("upstreams")
        .long("upstreams")
        .short('u')
        .value_name("LIST")
        .help("Whitespace-separated list of upstream \"host:port\" destinations"),
    )
    .arg(
      Arg::new("balance_policy")
        .long("balance-policy")
        .short('b')
        .value_name("POLICY")
        .help("Load balancing policy, one of \"random\" or \"robin\""),
    );
  let matches = options.get_matches();

  ///////////////////////////////////
  let config_file_path = matches.get_one::<String>("config_file").cloned();
  let listen_port = matches.get_one::<u16>("port").copied();
  let listen_ipv6 = matches.get_flag("ipv6");
  let upstreams = matches.get_one::<String>("upstreams").cloned();
  let balance_policy = matches.get_one::<String>("balance_policy").cloned();

  Ok(Opts {
    config_file_path,
    listen_port,
    listen_ipv6,
    upstreams,
    balance_policy,
  })
}

/// Build the proxy and backend settings from the optional config file and the cli
/// flags, flags taking precedence. Every value is validated here, at startup.
pub fn build_settings(opts: &Opts) -> std::result::Result<(ProxyConfig, BackendConfig), anyhow::Error> {
  let config = match &opts.config_file_path {
    Some(path) => ConfigToml::new(path)?,
    None => ConfigToml::default(),
  };
  merge_settings(&config, opts)
}

pub(super) fn merge_settings(
  config: &ConfigToml,
  opts: &Opts,
) -> std::result::Result<(ProxyConfig, BackendConfig), anyhow::Error> {
  // listen sockets
  let listen_port = opts.listen_port.or(config.listen_port).unwrap_or(DEFAULT_LISTEN_PORT);
  let listen_ipv6 = opts.listen_ipv6 || config.listen_ipv6.unwrap_or(false);
  // NOTE: when [::]:xx is bound, both v4 and v6 listeners are enabled.
  let listen_addresses: &[&str] = if listen_ipv6 {
    LISTEN_ADDRESSES_V6
  } else {
    LISTEN_ADDRESSES_V4
  };

  let mut proxy_config = ProxyConfig {
    listen_sockets: listen_addresses
      .iter()
      .map(|addr| format!("{addr}:{listen_port}").parse::<SocketAddr>().unwrap())
      .collect(),
    ..Default::default()
  };
  if let Some(c) = config.max_clients {
    proxy_config.max_clients = c as usize;
  }

  // upstream destinations: the cli list replaces the config-file list entirely
  let upstreams: Vec<String> = match &opts.upstreams {
    Some(list) => {
      let from_flag: Vec<String> = list.split_whitespace().map(|v| v.to_string()).collect();
      if config.upstreams.as_ref().is_some_and(|v| !v.is_empty()) {
        warn!("Upstream destinations from the config file are overridden by --upstreams");
      }
      from_flag
    }
    None => config.upstreams.clone().unwrap_or_default(),
  };
  ensure!(!upstreams.is_empty(), "At least one upstream destination is required");

  let balance_policy = opts.balance_policy.clone().or_else(|| config.balance_policy.clone());

  let backend_config = BackendConfig {
    upstreams,
    balance_policy,
  };

  Ok((proxy_config, backend_config))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn bare_opts() -> Opts {
    Opts {
      config_file_path: None,
      listen_port: None,
      listen_ipv6: false,
      upstreams: None,
      balance_policy: None,
    }
  }

  #[test]
  fn flags_override_config_file_values() {
    let config = ConfigToml {
      listen_port: Some(9090),
      listen_ipv6: None,
      max_clients: Some(128),
      upstreams: Some(vec!["file.local:1".to_string()]),
      balance_policy: Some("random".to_string()),
    };
    let opts = Opts {
      listen_port: Some(8081),
      upstreams: Some("flag-a.local:1 flag-b.local:2".to_string()),
      balance_policy: Some("robin".to_string()),
      ..bare_opts()
    };

    let (proxy_config, backend_config) = merge_settings(&config, &opts).unwrap();
    assert_eq!(proxy_config.listen_sockets, vec!["0.0.0.0:8081".parse().unwrap()]);
    assert_eq!(proxy_config.max_clients, 128);
    assert_eq!(
      backend_config.upstreams,
      vec!["flag-a.local:1".to_string(), "flag-b.local:2".to_string()]
    );
    assert_eq!(backend_config.balance_policy.as_deref(), Some("robin"));
  }

  #[test]
  fn defaults_apply_when_nothing_is_given() {
    let opts = Opts {
      upstreams: Some("a.local:1".to_string()),
      ..bare_opts()
    };
    let (proxy_config, backend_config) = merge_settings(&ConfigToml::default(), &opts).unwrap();
    assert_eq!(
      proxy_config.listen_sockets,
      vec![format!("0.0.0.0:{DEFAULT_LISTEN_PORT}").parse().unwrap()]
    );
    assert!(backend_config.balance_policy.is_none());
  }

  #[test]
  fn ipv6_listen_address_is_used_when_enabled() {
    let opts = Opts {
      listen_ipv6: true,
      upstreams: Some("a.local:1".to_string()),
      ..bare_opts()
    };
    let (proxy_config, _) = merge_settings(&ConfigToml::default(), &opts).unwrap();
    assert!(proxy_config.listen_sockets.iter().all(|addr| addr.is_ipv6()));
  }

  #[test]
  fn missing_upstreams_are_rejected() {
    assert!(merge_settings(&ConfigToml::default(), &bare_opts()).is_err());
  }
}
