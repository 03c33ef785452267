use super::load_balance::LoadBalance;
use crate::{error::LbxyError, globals::BackendConfig, log::*};
use derive_builder::Builder;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Single upstream destination, parsed once from a `"host:port"` descriptor at startup
pub struct Upstream {
  /// Hostname or ip address of the destination
  pub host: String,
  /// Destination port
  pub port: u16,
}

impl TryFrom<&str> for Upstream {
  type Error = LbxyError;

  /// A descriptor that does not parse makes the whole configuration unusable;
  /// it is rejected here rather than skipped.
  fn try_from(descriptor: &str) -> Result<Self, Self::Error> {
    let invalid = || LbxyError::InvalidUpstreamDestination(descriptor.to_string());

    // Split on the last colon so that bracketed ipv6 literals like "[::1]:8080" work
    let (host, port) = descriptor.rsplit_once(':').ok_or_else(invalid)?;
    // an unbracketed ipv6 literal without a port would otherwise split at its last group
    if host.contains(':') && !(host.starts_with('[') && host.ends_with(']')) {
      return Err(invalid());
    }
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
      return Err(invalid());
    }
    let port = port.parse::<u16>().map_err(|_| invalid())?;

    Ok(Self {
      host: host.to_string(),
      port,
    })
  }
}

impl Upstream {
  /// `host:port` in uri-authority form, bracketing ipv6 literals
  pub fn authority(&self) -> String {
    if self.host.contains(':') {
      format!("[{}]:{}", self.host, self.port)
    } else {
      format!("{}:{}", self.host, self.port)
    }
  }
}

#[derive(Debug, Clone, Builder)]
/// Ordered set of upstream destinations with the balancing policy chosen at startup.
/// Insertion order is preserved and defines the round-robin rotation order.
pub struct UpstreamGroup {
  #[builder(setter(custom))]
  /// Upstream destination(s)
  pub inner: Vec<Upstream>,

  #[builder(setter(custom), default)]
  /// Load balancing option
  pub load_balance: LoadBalance,
}

impl UpstreamGroupBuilder {
  /// Set the upstream destination(s)
  pub fn upstreams(&mut self, v: &[Upstream]) -> &mut Self {
    self.inner = Some(v.to_vec());
    self
  }
  /// Set the load balancing option
  pub fn load_balance(&mut self, v: LoadBalance) -> &mut Self {
    self.load_balance = Some(v);
    self
  }
}

impl TryFrom<&BackendConfig> for UpstreamGroup {
  type Error = LbxyError;

  fn try_from(config: &BackendConfig) -> Result<Self, Self::Error> {
    let upstreams = config
      .upstreams
      .iter()
      .map(|descriptor| Upstream::try_from(descriptor.as_str()))
      .collect::<Result<Vec<_>, _>>()?;

    let load_balance = match &config.balance_policy {
      Some(policy) => LoadBalance::try_from(policy.as_str())?,
      None => LoadBalance::default(),
    };

    for upstream in upstreams.iter() {
      info!("Registering upstream destination {}", upstream.authority());
    }

    let group = UpstreamGroupBuilder::default()
      .upstreams(&upstreams)
      .load_balance(load_balance)
      .build()?;
    Ok(group)
  }
}

impl UpstreamGroup {
  /// Choose the upstream destination serving the incoming request.
  /// `None` when the group is empty, regardless of the policy.
  pub fn select(&self) -> Option<&Upstream> {
    let chosen = self.load_balance.select(&self.inner);
    if let Some(upstream) = chosen {
      debug!("Upstream {} is chosen", upstream.authority());
    }
    chosen
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn descriptor_parsing_works() {
    let upstream = Upstream::try_from("backend.local:9000").unwrap();
    assert_eq!(upstream.host, "backend.local");
    assert_eq!(upstream.port, 9000);
    assert_eq!(upstream.authority(), "backend.local:9000");

    let v6 = Upstream::try_from("[::1]:8080").unwrap();
    assert_eq!(v6.host, "::1");
    assert_eq!(v6.port, 8080);
    assert_eq!(v6.authority(), "[::1]:8080");
  }

  #[test]
  fn bad_descriptors_are_rejected() {
    assert!(Upstream::try_from("no-port.local").is_err());
    assert!(Upstream::try_from(":9000").is_err());
    assert!(Upstream::try_from("host:not-a-port").is_err());
    assert!(Upstream::try_from("host:70000").is_err());
    // unbracketed ipv6 literal without a port
    assert!(Upstream::try_from("::1").is_err());
  }

  #[test]
  fn group_is_built_from_config_in_order() {
    let config = BackendConfig {
      upstreams: vec!["a.local:1".to_string(), "b.local:2".to_string()],
      balance_policy: Some("robin".to_string()),
    };
    let group = UpstreamGroup::try_from(&config).unwrap();
    assert_eq!(group.inner.len(), 2);
    assert_eq!(group.inner[0].host, "a.local");
    assert_eq!(group.inner[1].host, "b.local");

    // insertion order is the rotation order
    assert_eq!(group.select().unwrap().host, "a.local");
    assert_eq!(group.select().unwrap().host, "b.local");
    assert_eq!(group.select().unwrap().host, "a.local");
  }

  #[test]
  fn bad_policy_rejects_the_whole_config() {
    let config = BackendConfig {
      upstreams: vec!["a.local:1".to_string()],
      balance_policy: Some("sticky".to_string()),
    };
    assert!(UpstreamGroup::try_from(&config).is_err());
  }

  #[test]
  fn empty_group_selects_none() {
    let config = BackendConfig {
      upstreams: vec![],
      balance_policy: Some("robin".to_string()),
    };
    let group = UpstreamGroup::try_from(&config).unwrap();
    assert!(group.select().is_none());
  }
}
