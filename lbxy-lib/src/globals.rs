use crate::{backend::UpstreamGroup, constants::*};
use std::net::SocketAddr;
use std::sync::{
  atomic::{AtomicUsize, Ordering},
  Arc,
};
use tokio::time::Duration;

/// Global object containing proxy configurations and shared objects like counters.
/// Note that Globals has no Mutex or RwLock; it is the read-only context shared among async tasks,
/// except for the explicitly atomic counters it carries.
pub struct Globals {
  /// Configuration parameters for proxy transport and request handlers
  pub proxy_config: ProxyConfig,

  /// Upstream destinations, with the balancing policy fixed at startup,
  /// to which the request handler forwards incoming requests
  pub upstreams: UpstreamGroup,

  /// Shared context - Counter for serving requests
  pub request_count: RequestCount,

  /// Shared context - Async task runtime handler
  pub runtime_handle: tokio::runtime::Handle,

  /// Shared context - Notify object to stop proxy tasks
  pub term_notify: Option<Arc<tokio::sync::Notify>>,
}

/// Configuration parameters for proxy transport and request handlers
#[derive(PartialEq, Eq, Clone)]
pub struct ProxyConfig {
  /// Socket addresses the proxy listens on
  pub listen_sockets: Vec<SocketAddr>,
  /// TCP listen backlog
  pub tcp_listen_backlog: u32,

  /// Idle timeout for inbound connections
  pub proxy_idle_timeout: Duration,
  /// Timeout enforced on a single upstream round trip
  pub upstream_timeout: Duration,
  /// Keep-alive timeout for pooled upstream connections
  pub upstream_idle_timeout: Duration,
  /// Optional hard limit on total handling time of a single connection
  pub connection_handling_timeout: Option<Duration>,

  /// Maximum number of concurrently served connections
  pub max_clients: usize,
  /// Maximum number of concurrent h2 streams per connection
  pub max_concurrent_streams: u32,
  /// Whether inbound http/1.1 keep-alive is enabled
  pub keepalive: bool,
}

impl Default for ProxyConfig {
  fn default() -> Self {
    Self {
      listen_sockets: Vec::new(),
      tcp_listen_backlog: TCP_LISTEN_BACKLOG,

      proxy_idle_timeout: Duration::from_secs(PROXY_IDLE_TIMEOUT_SEC),
      upstream_timeout: Duration::from_secs(UPSTREAM_TIMEOUT_SEC),
      upstream_idle_timeout: Duration::from_secs(UPSTREAM_IDLE_TIMEOUT_SEC),
      connection_handling_timeout: None,

      max_clients: MAX_CLIENTS,
      max_concurrent_streams: MAX_CONCURRENT_STREAMS,
      keepalive: true,
    }
  }
}

/// Configuration parameters for the upstream destinations, passed from the bootstrap layer.
/// Converted into [`UpstreamGroup`] when `Globals` is built, where descriptors and the
/// policy string are validated. Invalid values reject the whole configuration at startup.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct BackendConfig {
  /// Upstream destinations as `"host:port"` descriptors, in balancing order
  pub upstreams: Vec<String>,
  /// Load balancing policy identifier (`"random"` or `"robin"`)
  pub balance_policy: Option<String>,
}

#[derive(Debug, Clone, Default)]
/// Counter for serving requests
pub struct RequestCount(Arc<AtomicUsize>);

impl RequestCount {
  pub fn current(&self) -> usize {
    self.0.load(Ordering::Relaxed)
  }

  pub fn increment(&self) -> usize {
    self.0.fetch_add(1, Ordering::Relaxed)
  }

  pub fn decrement(&self) -> usize {
    let mut count;
    while {
      count = self.0.load(Ordering::Relaxed);
      count > 0
        && self
          .0
          .compare_exchange(count, count - 1, Ordering::Relaxed, Ordering::Relaxed)
          != Ok(count)
    } {}
    count
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn request_count_is_floored_at_zero() {
    let count = RequestCount::default();
    assert_eq!(count.current(), 0);
    count.increment();
    count.increment();
    assert_eq!(count.current(), 2);
    count.decrement();
    count.decrement();
    count.decrement();
    assert_eq!(count.current(), 0);
  }
}
