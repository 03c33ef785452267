use crate::{
  error::{LbxyError, LbxyResult},
  globals::Globals,
  hyper_ext::LocalExecutor,
  log::*,
};
use async_trait::async_trait;
use http::{Request, Response};
use hyper::body::{Body, Incoming};
use hyper_util::client::legacy::{
  connect::{Connect, HttpConnector},
  Client,
};
use std::sync::Arc;

#[async_trait]
/// Definition of the forwarder that executes the round trip of a prepared request
/// against the chosen upstream destination and hands back its response.
pub trait ForwardRequest<B1, B2> {
  type Error;
  async fn request(&self, req: Request<B1>) -> Result<Response<B2>, Self::Error>;
}

/// Forwarder http client wrapping a pooled hyper client
pub struct Forwarder<C, B> {
  inner: Client<C, B>,
}

#[async_trait]
impl<C, B1> ForwardRequest<B1, Incoming> for Forwarder<C, B1>
where
  C: Send + Sync + Connect + Clone + 'static,
  B1: Body + Send + Sync + Unpin + 'static,
  <B1 as Body>::Data: Send,
  <B1 as Body>::Error: Into<Box<(dyn std::error::Error + Send + Sync + 'static)>>,
{
  type Error = LbxyError;

  async fn request(&self, req: Request<B1>) -> Result<Response<Incoming>, Self::Error> {
    self
      .inner
      .request(req)
      .await
      .map_err(|e| LbxyError::FailedToFetchFromUpstream(e.to_string()))
  }
}

impl<B> Forwarder<HttpConnector, B>
where
  B: Body + Send + Unpin + 'static,
  <B as Body>::Data: Send,
  <B as Body>::Error: Into<Box<(dyn std::error::Error + Send + Sync + 'static)>>,
{
  /// Build the inner client over cleartext http
  pub fn try_new(globals: &Arc<Globals>) -> LbxyResult<Self> {
    debug!("Building cleartext http forwarder for upstream destinations");
    let executor = LocalExecutor::new(globals.runtime_handle.clone());
    let mut http = HttpConnector::new();
    http.enforce_http(true);
    http.set_reuse_address(true);
    http.set_keepalive(Some(globals.proxy_config.upstream_idle_timeout));
    let inner = Client::builder(executor).build::<_, B>(http);

    Ok(Self { inner })
  }
}
