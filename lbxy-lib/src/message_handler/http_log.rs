use crate::log::*;
use http::header;
use std::net::SocketAddr;

/// Struct to log HTTP messages
#[derive(Debug, Clone)]
pub struct HttpMessageLog {
  pub client_addr: String,
  pub method: String,
  pub host: String,
  pub p_and_q: String,
  pub version: http::Version,
  pub ua: String,
  pub xff: String,
  pub status: String,
  pub upstream: String,
}

impl<T> From<&http::Request<T>> for HttpMessageLog {
  fn from(req: &http::Request<T>) -> Self {
    let header_mapper = |v: header::HeaderName| {
      req
        .headers()
        .get(v)
        .map_or_else(|| "", |s| s.to_str().unwrap_or(""))
        .to_string()
    };
    Self {
      client_addr: "".to_string(),
      method: req.method().to_string(),
      host: header_mapper(header::HOST),
      p_and_q: req.uri().path_and_query().map_or_else(|| "", |v| v.as_str()).to_string(),
      version: req.version(),
      ua: header_mapper(header::USER_AGENT),
      xff: "".to_string(),
      status: "".to_string(),
      upstream: "".to_string(),
    }
  }
}

impl std::fmt::Display for HttpMessageLog {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(
      f,
      "{} <- {} -- {} {} {:?} -- {} -- \"{}\", \"{}\" \"{}\"",
      self.host, self.client_addr, self.method, self.p_and_q, self.version, self.status, self.ua, self.xff, self.upstream
    )
  }
}

impl HttpMessageLog {
  pub fn client_addr(&mut self, client_addr: &SocketAddr) -> &mut Self {
    self.client_addr = SocketAddr::new(client_addr.ip().to_canonical(), client_addr.port()).to_string();
    self
  }
  pub fn status_code(&mut self, status_code: &http::StatusCode) -> &mut Self {
    self.status = status_code.to_string();
    self
  }
  pub fn xff(&mut self, xff: &Option<&header::HeaderValue>) -> &mut Self {
    self.xff = xff.map_or_else(|| "", |v| v.to_str().unwrap_or("")).to_string();
    self
  }
  pub fn upstream(&mut self, upstream: &http::Uri) -> &mut Self {
    self.upstream = upstream.to_string();
    self
  }

  pub fn output(&self) {
    info!(
      name: crate::constants::log_event_names::ACCESS_LOG,
      "{}", self
    );
  }
}
