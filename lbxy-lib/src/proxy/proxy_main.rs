use super::socket::bind_tcp_socket;
use crate::{
  error::LbxyResult,
  globals::Globals,
  hyper_ext::{IncomingOr, LocalExecutor, RequestBody, ResponseBody},
  log::*,
  message_handler::HttpMessageHandler,
};
use derive_builder::Builder;
use http::{Request, Response};
use hyper::{
  body::Incoming,
  rt::{Read, Write},
  service::service_fn,
};
use hyper_util::{rt::TokioIo, server::conn::auto::Builder as ConnectionBuilder};
use std::{net::SocketAddr, sync::Arc};
use tokio::time::timeout;

/// Wrapper function to handle a request for HTTP/1.1 and HTTP/2
async fn serve_request(
  req: Request<Incoming>,
  handler: Arc<HttpMessageHandler>,
  client_addr: SocketAddr,
  tls_enabled: bool,
) -> LbxyResult<Response<ResponseBody>> {
  let req: Request<RequestBody> = req.map(IncomingOr::Left);
  handler.handle_request(req, client_addr, tls_enabled).await
}

#[derive(Clone, Builder)]
/// Proxy main object responsible to serve requests received from clients at the given socket address.
pub(crate) struct Proxy {
  /// global context shared among async tasks
  pub globals: Arc<Globals>,
  /// listen socket address
  pub listening_on: SocketAddr,
  /// hyper connection builder serving http requests
  pub connection_builder: Arc<ConnectionBuilder<LocalExecutor>>,
  /// message handler serving incoming http requests
  pub message_handler: Arc<HttpMessageHandler>,
}

impl Proxy {
  /// Serves requests from a single client connection
  fn serve_connection<I>(&self, stream: I, peer_addr: SocketAddr)
  where
    I: Read + Write + Send + Unpin + 'static,
  {
    let request_count = self.globals.request_count.clone();
    if request_count.increment() > self.globals.proxy_config.max_clients {
      request_count.decrement();
      return;
    }
    trace!("Connection incoming: current # {}", request_count.current());

    let connection_builder = self.connection_builder.clone();
    let message_handler = self.message_handler.clone();
    let handling_timeout = self.globals.proxy_config.connection_handling_timeout;

    self.globals.runtime_handle.clone().spawn(async move {
      let fut = connection_builder.serve_connection_with_upgrades(
        stream,
        service_fn(move |req: Request<Incoming>| {
          // serving only cleartext http, the tls flag stays false here
          serve_request(req, message_handler.clone(), peer_addr, false)
        }),
      );

      if let Some(handling_timeout) = handling_timeout {
        timeout(handling_timeout, fut).await.ok();
      } else {
        fut.await.ok();
      }

      request_count.decrement();
      trace!("Connection processed: current # {}", request_count.current());
    });
  }

  /// Accept loop over the listen socket
  async fn listener_service(&self) -> LbxyResult<()> {
    let tcp_socket = bind_tcp_socket(&self.listening_on)?;
    let tcp_listener = tcp_socket.listen(self.globals.proxy_config.tcp_listen_backlog)?;
    info!("Start TCP proxy serving with HTTP request on {}", self.listening_on);
    while let Ok((stream, client_addr)) = tcp_listener.accept().await {
      self.serve_connection(TokioIo::new(stream), client_addr);
    }
    Ok(())
  }

  /// Entrypoint of the proxy service for a single listen socket
  pub async fn start(&self) -> LbxyResult<()> {
    match &self.globals.term_notify {
      Some(term) => {
        tokio::select! {
          res = self.listener_service() => {
            warn!("Proxy service got down");
            res
          }
          _ = term.notified() => {
            info!("Proxy service listening on {} receives term signal", self.listening_on);
            Ok(())
          }
        }
      }
      None => {
        let res = self.listener_service().await;
        warn!("Proxy service got down");
        res
      }
    }
  }
}
