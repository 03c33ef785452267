mod proxy_main;
mod socket;

use crate::{globals::Globals, hyper_ext::LocalExecutor};
use hyper_util::{
  rt::TokioTimer,
  server::{self, conn::auto::Builder as ConnectionBuilder},
};
use std::sync::Arc;

pub(crate) use proxy_main::ProxyBuilder;

/// build connection builder shared with proxy instances
pub(crate) fn connection_builder(globals: &Arc<Globals>) -> Arc<ConnectionBuilder<LocalExecutor>> {
  let executor = LocalExecutor::new(globals.runtime_handle.clone());
  let mut http_server = server::conn::auto::Builder::new(executor);
  http_server
    .http1()
    .keep_alive(globals.proxy_config.keepalive)
    .header_read_timeout(globals.proxy_config.proxy_idle_timeout)
    .timer(TokioTimer::new())
    .pipeline_flush(true);
  http_server
    .http2()
    .keep_alive_interval(Some(globals.proxy_config.proxy_idle_timeout))
    .timer(TokioTimer::new())
    .max_concurrent_streams(globals.proxy_config.max_concurrent_streams);
  Arc::new(http_server)
}
