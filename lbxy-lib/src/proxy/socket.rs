use crate::{error::LbxyResult, log::*};
use std::net::SocketAddr;
use tokio::net::TcpSocket;

/// Bind a TCP socket to the given `SocketAddr` with `SO_REUSEADDR` and `SO_REUSEPORT`
/// set, so the address can be re-bound immediately when the proxy is restarted.
pub(super) fn bind_tcp_socket(listening_on: &SocketAddr) -> LbxyResult<TcpSocket> {
  let tcp_socket = if listening_on.is_ipv6() {
    TcpSocket::new_v6()
  } else {
    TcpSocket::new_v4()
  }?;
  tcp_socket.set_reuseaddr(true)?;
  tcp_socket.set_reuseport(true)?;

  if let Err(e) = tcp_socket.bind(*listening_on) {
    error!("Failed to bind TCP socket at {listening_on}: {e}");
    return Err(e.into());
  }
  Ok(tcp_socket)
}
