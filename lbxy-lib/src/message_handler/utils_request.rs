use super::{
  http_result::{HttpError, HttpResult},
  utils_headers::*,
};
use crate::backend::Upstream;
use http::{request::Parts, Request, Uri, Version};

/// Build a forwarding-safe copy of the inbound request.
///
/// The copy owns its header map and carries an origin-form uri (scheme and
/// authority cleared; the destination is decided later by the dispatcher), so
/// nothing done to it can leak back into the retained inbound parts, which are
/// still needed for access logging and error context. On top of the plain copy:
/// an absent `User-Agent` is pinned to the empty string, `Connection`-named
/// headers are stripped, a requested protocol upgrade is re-emitted, and the
/// forwarded client-identity headers are injected.
pub(super) fn prepare_request<B>(
  parts: &Parts,
  body: B,
  client_addr: &str,
  tls_enabled: bool,
  upgrade: &Option<String>,
) -> HttpResult<Request<B>> {
  let origin_form = {
    let p_and_q = parts.uri.path_and_query().map_or("/", |v| v.as_str());
    Uri::builder()
      .path_and_query(p_and_q)
      .build()
      .map_err(|e| HttpError::FailedToPrepareRequest(e.to_string()))?
  };

  let mut req = Request::new(body);
  *req.method_mut() = parts.method.clone();
  *req.version_mut() = parts.version;
  *req.uri_mut() = origin_form;
  let headers = req.headers_mut();
  for (name, value) in parts.headers.iter() {
    headers.append(name.clone(), value.clone());
  }

  normalize_user_agent(headers);
  remove_connection_headers(headers);
  if let Some(upgrade) = upgrade {
    set_upgrade_headers(headers, upgrade).map_err(|e| HttpError::FailedToPrepareRequest(e.to_string()))?;
  }
  append_forwarded_identity(headers, client_addr, tls_enabled)
    .map_err(|e| HttpError::FailedToPrepareRequest(e.to_string()))?;

  Ok(req)
}

/// Point the prepared request at the chosen upstream destination. The scheme is
/// the transport collaborator's cleartext default, which also pins the wire
/// format to http/1.1.
pub(super) fn direct_request_to<B>(req: &mut Request<B>, upstream: &Upstream) -> HttpResult<()> {
  let p_and_q = req
    .uri()
    .path_and_query()
    .map_or_else(|| "/".to_string(), |v| v.as_str().to_string());
  let uri = Uri::builder()
    .scheme("http")
    .authority(upstream.authority())
    .path_and_query(p_and_q)
    .build()
    .map_err(|e| HttpError::FailedToPrepareRequest(e.to_string()))?;

  *req.uri_mut() = uri;
  *req.version_mut() = Version::HTTP_11;
  Ok(())
}
