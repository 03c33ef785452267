mod backend;
mod constants;
mod error;
mod forwarder;
mod globals;
mod hyper_ext;
mod log;
mod message_handler;
mod proxy;

use crate::{
  error::*, forwarder::Forwarder, globals::Globals, log::*, message_handler::HttpMessageHandlerBuilder,
  proxy::ProxyBuilder,
};
use futures::future::select_all;
use std::sync::Arc;

pub use crate::{
  backend::load_balance_options,
  error::{LbxyError, LbxyResult},
  globals::{BackendConfig, ProxyConfig},
};

/// Entrypoint that creates and spawns the tasks of the proxy services
pub async fn entrypoint(
  proxy_config: &ProxyConfig,
  backend_config: &BackendConfig,
  runtime_handle: &tokio::runtime::Handle,
  term_notify: Option<Arc<tokio::sync::Notify>>,
) -> LbxyResult<()> {
  // For initial message logging
  if proxy_config.listen_sockets.iter().any(|addr| addr.is_ipv6()) {
    info!("Listen both IPv4 and IPv6")
  } else {
    info!("Listen IPv4")
  }
  info!(
    "Balancing policy over {} upstream destination(s): {}",
    backend_config.upstreams.len(),
    backend_config
      .balance_policy
      .as_deref()
      .unwrap_or(load_balance_options::RANDOM)
  );

  // build the global shared context; descriptors and the balancing policy are
  // validated here, before any listener is bound
  let globals = Arc::new(Globals {
    proxy_config: proxy_config.clone(),
    upstreams: (backend_config).try_into()?,
    request_count: Default::default(),
    runtime_handle: runtime_handle.clone(),
    term_notify,
  });

  // build message handler including the request forwarder
  let msg_handler = Arc::new(
    HttpMessageHandlerBuilder::default()
      .globals(globals.clone())
      .forwarder(Arc::new(Forwarder::try_new(&globals)?))
      .build()?,
  );

  let connection_builder = proxy::connection_builder(&globals);

  let addresses = globals.proxy_config.listen_sockets.clone();
  let futures = select_all(addresses.into_iter().map(|addr| {
    let proxy = ProxyBuilder::default()
      .globals(globals.clone())
      .listening_on(addr)
      .connection_builder(connection_builder.clone())
      .message_handler(msg_handler.clone())
      .build()
      .unwrap();

    globals.runtime_handle.spawn(async move { proxy.start().await })
  }));

  // wait for all proxy tasks
  if let (Ok(Err(e)), _, _) = futures.await {
    error!("Some proxy services are down: {}", e);
  };

  Ok(())
}
