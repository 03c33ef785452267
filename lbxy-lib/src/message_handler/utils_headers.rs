use crate::log::*;
use http::{header, HeaderMap, HeaderValue};
use std::net::SocketAddr;

/// Forwarded client-identity headers injected (or scrubbed) before forwarding
const FORWARDED_HEADERS: &[&str] = &["x-forwarded-for", "x-forwarded-proto", "x-forwarded-host"];

/// Hop header names which are removed from upstream responses before they are
/// passed back downstream
const HOP_HEADERS: &[&str] = &[
  "connection",
  "te",
  "trailer",
  "keep-alive",
  "proxy-connection",
  "proxy-authenticate",
  "proxy-authorization",
  "transfer-encoding",
  "upgrade",
];

/// Delete every header named by a `Connection` value token, then the `Connection`
/// header itself, per [RFC 7230 §6.1](https://www.rfc-editor.org/rfc/rfc7230#section-6.1):
/// connection-specific headers must not travel past this hop.
pub(super) fn remove_connection_headers(headers: &mut HeaderMap) {
  let named: Vec<String> = headers
    .get_all(header::CONNECTION)
    .iter()
    .filter_map(|v| v.to_str().ok())
    .flat_map(|v| v.split(','))
    .map(|token| token.trim().to_string())
    .filter(|token| !token.is_empty())
    .collect();
  for name in named.iter() {
    headers.remove(name.as_str());
  }
  headers.remove(header::CONNECTION);
}

/// Remove hop headers from an upstream response
pub(super) fn remove_hop_headers(headers: &mut HeaderMap) {
  HOP_HEADERS.iter().for_each(|key| {
    headers.remove(*key);
  });
}

/// An absent `User-Agent` is pinned to the empty string so that the upstream
/// client library cannot substitute its own default later in the pipeline.
pub(super) fn normalize_user_agent(headers: &mut HeaderMap) {
  headers
    .entry(header::USER_AGENT)
    .or_insert(HeaderValue::from_static(""));
}

/// Extract the requested upgrade protocol, lowercased, if the request carries one
pub(super) fn extract_upgrade(headers: &HeaderMap) -> Option<String> {
  let upgrade = headers.get(header::UPGRADE)?.to_str().ok()?;
  if upgrade.is_empty() {
    return None;
  }
  debug!("Upgrade in request header: {}", upgrade);
  Some(upgrade.to_ascii_lowercase())
}

/// Re-emit the upgrade negotiation headers on the prepared request, which the
/// connection-header sanitization above would otherwise have stripped
pub(super) fn set_upgrade_headers(headers: &mut HeaderMap, upgrade: &str) -> anyhow::Result<()> {
  headers.insert(header::UPGRADE, upgrade.parse()?);
  headers.insert(header::CONNECTION, HeaderValue::from_static("upgrade"));
  Ok(())
}

/// Inject forwarded client-identity headers from the connection metadata.
///
/// When the client address does not parse as `ip:port`, every `X-Forwarded-*`
/// header is deleted instead and nothing is injected: a value we cannot derive
/// ourselves must not be left to the client to supply. This path is not an error;
/// preparation continues without the identity headers.
pub(super) fn append_forwarded_identity(headers: &mut HeaderMap, client_addr: &str, tls_enabled: bool) -> anyhow::Result<()> {
  let Ok(client_addr) = client_addr.parse::<SocketAddr>() else {
    warn!("Unparsable client address {client_addr:?}, scrubbing forwarded headers");
    for name in FORWARDED_HEADERS.iter() {
      headers.remove(*name);
    }
    return Ok(());
  };

  let client_ip = client_addr.ip().to_canonical().to_string();
  let original_host = headers
    .get(header::HOST)
    .cloned()
    .unwrap_or_else(|| HeaderValue::from_static(""));

  headers.insert("x-forwarded-for", client_ip.parse()?);
  headers.insert(
    "x-forwarded-proto",
    HeaderValue::from_static(if tls_enabled { "https" } else { "http" }),
  );
  headers.insert("x-forwarded-host", original_host);

  Ok(())
}
