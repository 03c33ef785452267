use super::{
  http_log::HttpMessageLog,
  http_result::{HttpError, HttpResult},
  synthetic_response::error_envelope_response,
  utils_headers::{extract_upgrade, remove_connection_headers, remove_hop_headers},
  utils_request::{direct_request_to, prepare_request},
};
use crate::{
  constants::RESPONSE_HEADER_SERVER,
  error::{LbxyError, LbxyResult},
  forwarder::{ForwardRequest, Forwarder},
  globals::Globals,
  hyper_ext::{IncomingOr, RequestBody, ResponseBody},
  log::*,
};
use derive_builder::Builder;
use http::{header, HeaderValue, Request, Response, StatusCode};
use hyper::upgrade::OnUpgrade;
use hyper_util::rt::TokioIo;
use std::{net::SocketAddr, sync::Arc};
use tokio::{io::copy_bidirectional, time::timeout};

#[derive(Clone, Builder)]
/// Message handler serving incoming http requests: prepares a forwarding-safe
/// copy of each request, picks an upstream destination, executes the round trip
/// through the forwarder, and passes the response back. Any failure is answered
/// with a synthetic json error envelope.
pub struct HttpMessageHandler {
  /// Global context shared among the handling tasks
  globals: Arc<Globals>,
  /// Upstream transport collaborator
  forwarder: Arc<Forwarder>,
}

impl HttpMessageHandler {
  fn return_with_error_log(&self, e: HttpError, log_data: &mut HttpMessageLog) -> LbxyResult<Response<ResponseBody>> {
    warn!("{e}");
    let res = error_envelope_response(&e)?;
    log_data.status_code(&res.status()).output();
    Ok(res)
  }

  /// Entrypoint for handling an incoming http request.
  /// A single request's failure is converted into an error envelope here and never
  /// propagates to the connection level, so concurrent requests are unaffected.
  pub async fn handle_request(
    &self,
    req: Request<RequestBody>,
    client_addr: SocketAddr,
    tls_enabled: bool,
  ) -> LbxyResult<Response<ResponseBody>> {
    let mut log_data = HttpMessageLog::from(&req);
    log_data.client_addr(&client_addr);

    match self.serve(req, client_addr, tls_enabled, &mut log_data).await {
      Ok(res) => {
        log_data.status_code(&res.status()).output();
        Ok(res)
      }
      Err(e) => self.return_with_error_log(e, &mut log_data),
    }
  }

  async fn serve(
    &self,
    mut req: Request<RequestBody>,
    client_addr: SocketAddr,
    tls_enabled: bool,
    log_data: &mut HttpMessageLog,
  ) -> HttpResult<Response<ResponseBody>> {
    // Capture the upgrade intent before sanitization strips it
    let upgrade_in_request = extract_upgrade(req.headers());
    let request_upgraded = req.extensions_mut().remove::<OnUpgrade>();

    // The retained parts keep serving as logging and error context; the prepared
    // copy is the only thing that travels upstream.
    let (parts, body) = req.into_parts();
    let mut forwarded_req = prepare_request(
      &parts,
      body,
      &client_addr.to_string(),
      tls_enabled,
      &upgrade_in_request,
    )?;

    // Fix the unique upstream destination out of the candidates
    let upstream = self
      .globals
      .upstreams
      .select()
      .ok_or(HttpError::NoUpstreamAvailable)?;
    direct_request_to(&mut forwarded_req, upstream)?;

    log_data.xff(&forwarded_req.headers().get("x-forwarded-for"));
    log_data.upstream(forwarded_req.uri());
    debug!("Request to be forwarded: {} {}", forwarded_req.method(), forwarded_req.uri());

    // Round trip, bounded by the configured upstream deadline
    let mut res_upstream = match timeout(
      self.globals.proxy_config.upstream_timeout,
      self.forwarder.request(forwarded_req),
    )
    .await
    {
      Err(_) => return Err(HttpError::UpstreamTimeout),
      Ok(Err(LbxyError::FailedToFetchFromUpstream(msg))) => return Err(HttpError::UpstreamUnreachable(msg)),
      Ok(Err(e)) => return Err(HttpError::Other(e.into())),
      Ok(Ok(res)) => res,
    };

    if res_upstream.status() != StatusCode::SWITCHING_PROTOCOLS {
      self.generate_response_forwarded(&mut res_upstream);
      return Ok(res_upstream.map(IncomingOr::Left));
    }

    // 101: the upstream accepted the protocol switch. Splice the two upgraded
    // streams on a spawned task and hand the 101 back to the client.
    let upgrade_in_response = extract_upgrade(res_upstream.headers());
    let matched = match (upgrade_in_request.as_ref(), upgrade_in_response.as_ref()) {
      // both sides lowercased at extraction
      (Some(req_u), Some(res_u)) => req_u == res_u,
      _ => false,
    };
    if !matched {
      // dropping the response here releases its body and the upstream connection
      return Err(HttpError::UpgradeProtocolMismatch {
        requested: upgrade_in_request,
        returned: upgrade_in_response,
      });
    }
    let Some(request_upgraded) = request_upgraded else {
      return Err(HttpError::NoUpgradeExtensionInRequest);
    };
    let Some(response_upgraded) = res_upstream.extensions_mut().remove::<OnUpgrade>() else {
      return Err(HttpError::NoUpgradeExtensionInResponse);
    };

    self.globals.runtime_handle.spawn(async move {
      let mut response_upgraded = TokioIo::new(response_upgraded.await.map_err(|e| {
        error!("Failed to upgrade response: {e}");
        LbxyError::FailedToUpgradeResponse(e.to_string())
      })?);
      let mut request_upgraded = TokioIo::new(request_upgraded.await.map_err(|e| {
        error!("Failed to upgrade request: {e}");
        LbxyError::FailedToUpgradeRequest(e.to_string())
      })?);
      copy_bidirectional(&mut response_upgraded, &mut request_upgraded)
        .await
        .map_err(|e| {
          error!("Copying between upgraded connections failed: {e}");
          LbxyError::FailedToCopyBidirectional(e.to_string())
        })?;
      Ok(()) as LbxyResult<()>
    });

    Ok(res_upstream.map(IncomingOr::Left))
  }

  /// Sanitize an upstream response before it is passed back downstream
  fn generate_response_forwarded<B>(&self, response: &mut Response<B>) {
    let headers = response.headers_mut();
    remove_connection_headers(headers);
    remove_hop_headers(headers);
    headers.insert(header::SERVER, HeaderValue::from_static(RESPONSE_HEADER_SERVER));
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    backend::UpstreamGroup,
    globals::{BackendConfig, ProxyConfig},
    hyper_ext::full,
  };
  use bytes::Bytes;
  use http::Method;
  use http_body_util::{BodyExt, Full};
  use hyper::{body::Incoming, service::service_fn};
  use std::net::SocketAddr;

  const CLIENT_ADDR: &str = "127.0.0.1:55555";

  /// Loopback upstream answering with its tag as body and echoing selected
  /// request headers back as `echo-*` response headers
  async fn spawn_upstream(tag: &'static str) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
      loop {
        let Ok((stream, _)) = listener.accept().await else {
          break;
        };
        tokio::spawn(async move {
          let service = service_fn(move |req: Request<Incoming>| async move {
            let mut res = Response::new(Full::new(Bytes::from(tag)));
            for name in ["x-forwarded-for", "x-forwarded-proto", "x-forwarded-host", "user-agent"] {
              if let Some(v) = req.headers().get(name) {
                let echo = http::HeaderName::from_bytes(format!("echo-{name}").as_bytes()).unwrap();
                res.headers_mut().insert(echo, v.clone());
              }
            }
            Ok::<_, std::convert::Infallible>(res)
          });
          hyper::server::conn::http1::Builder::new()
            .serve_connection(TokioIo::new(stream), service)
            .await
            .ok();
        });
      }
    });
    addr
  }

  fn build_handler(upstreams: Vec<String>, policy: &str) -> HttpMessageHandler {
    let backend_config = BackendConfig {
      upstreams,
      balance_policy: Some(policy.to_string()),
    };
    let globals = Arc::new(Globals {
      proxy_config: ProxyConfig::default(),
      upstreams: UpstreamGroup::try_from(&backend_config).unwrap(),
      request_count: Default::default(),
      runtime_handle: tokio::runtime::Handle::current(),
      term_notify: None,
    });
    let forwarder = Arc::new(Forwarder::try_new(&globals).unwrap());
    HttpMessageHandlerBuilder::default()
      .globals(globals)
      .forwarder(forwarder)
      .build()
      .unwrap()
  }

  fn inbound_request() -> Request<RequestBody> {
    Request::builder()
      .method(Method::GET)
      .uri("/ping")
      .header(header::HOST, "proxy.example")
      .body(IncomingOr::Right(full(Bytes::new())))
      .unwrap()
  }

  #[tokio::test]
  async fn round_robin_dispatches_in_registry_order() {
    let a = spawn_upstream("A").await;
    let b = spawn_upstream("B").await;
    let handler = build_handler(vec![a.to_string(), b.to_string()], "robin");
    let client_addr: SocketAddr = CLIENT_ADDR.parse().unwrap();

    for expected in ["A", "B", "A"] {
      let res = handler
        .handle_request(inbound_request(), client_addr, false)
        .await
        .unwrap();
      assert_eq!(res.status(), StatusCode::OK);
      assert_eq!(res.headers().get(header::SERVER).unwrap(), RESPONSE_HEADER_SERVER);
      let body = res.into_body().collect().await.unwrap().to_bytes();
      assert_eq!(body, Bytes::from(expected));
    }
  }

  #[tokio::test]
  async fn forwarded_identity_reaches_the_upstream() {
    let a = spawn_upstream("A").await;
    let handler = build_handler(vec![a.to_string()], "robin");
    let client_addr: SocketAddr = CLIENT_ADDR.parse().unwrap();

    let res = handler
      .handle_request(inbound_request(), client_addr, false)
      .await
      .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let headers = res.headers();
    assert_eq!(headers.get("echo-x-forwarded-for").unwrap(), "127.0.0.1");
    assert_eq!(headers.get("echo-x-forwarded-proto").unwrap(), "http");
    assert_eq!(headers.get("echo-x-forwarded-host").unwrap(), "proxy.example");
    // absent inbound user-agent is forwarded as the empty string, not dropped
    assert_eq!(headers.get("echo-user-agent").unwrap(), "");
  }

  #[tokio::test]
  async fn unreachable_upstream_yields_the_error_envelope() {
    // reserve a port, then close the listener so nothing serves it
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let handler = build_handler(vec![addr.to_string()], "robin");
    let client_addr: SocketAddr = CLIENT_ADDR.parse().unwrap();

    let res = handler
      .handle_request(inbound_request(), client_addr, false)
      .await
      .unwrap();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(res.headers().get(header::CONTENT_TYPE).unwrap(), "application/json");

    let body = res.into_body().collect().await.unwrap().to_bytes();
    let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value["status_code"], 500);
    assert!(value["data"].is_null());
    assert!(value["message"].as_str().unwrap().starts_with("Upstream unreachable"));
  }

  #[tokio::test]
  async fn empty_registry_yields_the_error_envelope() {
    let handler = build_handler(vec![], "random");
    let client_addr: SocketAddr = CLIENT_ADDR.parse().unwrap();

    let res = handler
      .handle_request(inbound_request(), client_addr, false)
      .await
      .unwrap();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body = res.into_body().collect().await.unwrap().to_bytes();
    let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value["message"], "No upstream destination available");
  }
}
