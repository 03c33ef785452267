use super::http_result::HttpError;
use crate::{
  error::LbxyResult,
  hyper_ext::{full, IncomingOr, ResponseBody},
};
use http::{header, Response, StatusCode};
use serde::Serialize;

/// The single response shape for any failure path
#[derive(Debug, Serialize)]
struct ErrorEnvelope {
  status_code: u16,
  data: Option<serde_json::Value>,
  message: String,
}

/// Build the synthetic json error response for a failed request. The envelope's
/// `status_code` always equals the http status, and the status line plus headers
/// are committed in one piece by the response builder, never partially.
pub(super) fn error_envelope_response(e: &HttpError) -> LbxyResult<Response<ResponseBody>> {
  let status_code = StatusCode::from(e);
  // unanticipated failures keep their detail in the log, not on the wire
  let message = match e {
    HttpError::Other(_) => "Internal server error".to_string(),
    e => e.to_string(),
  };
  let envelope = ErrorEnvelope {
    status_code: status_code.as_u16(),
    data: None,
    message,
  };
  let body = serde_json::to_vec(&envelope)?;

  let res = Response::builder()
    .status(status_code)
    .header(header::CONTENT_TYPE, "application/json")
    .body(IncomingOr::Right(full(body.into())))?;
  Ok(res)
}

#[cfg(test)]
mod tests {
  use super::*;
  use http_body_util::BodyExt;

  #[tokio::test]
  async fn envelope_shape_matches_the_wire_format() {
    let res = error_envelope_response(&HttpError::NoUpstreamAvailable).unwrap();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(res.headers().get(header::CONTENT_TYPE).unwrap(), "application/json");

    let body = res.into_body().collect().await.unwrap().to_bytes();
    let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value["status_code"], 500);
    assert!(value["data"].is_null());
    assert_eq!(value["message"], "No upstream destination available");
  }
}
