pub const RESPONSE_HEADER_SERVER: &str = "lbxy";
pub const TCP_LISTEN_BACKLOG: u32 = 1024;
pub const PROXY_IDLE_TIMEOUT_SEC: u64 = 20;
pub const UPSTREAM_IDLE_TIMEOUT_SEC: u64 = 20;
pub const UPSTREAM_TIMEOUT_SEC: u64 = 60;
pub const MAX_CLIENTS: usize = 512;
pub const MAX_CONCURRENT_STREAMS: u32 = 64;

/// Logging event name
pub mod log_event_names {
  /// access log
  pub const ACCESS_LOG: &str = "lbxy::access";
}
