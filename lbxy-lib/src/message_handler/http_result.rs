use http::StatusCode;
use thiserror::Error;

/// HTTP result type, T is typically a hyper::Response.
/// HttpError is turned into a synthetic error-envelope response.
pub(crate) type HttpResult<T> = std::result::Result<T, HttpError>;

/// Describes things that can go wrong while serving a single request
#[derive(Debug, Error)]
pub enum HttpError {
  #[error("Failed to prepare request for forwarding: {0}")]
  FailedToPrepareRequest(String),
  #[error("No upstream destination available")]
  NoUpstreamAvailable,
  #[error("Upstream unreachable: {0}")]
  UpstreamUnreachable(String),
  #[error("Upstream round trip timed out")]
  UpstreamTimeout,

  #[error("Request does not have an upgrade extension")]
  NoUpgradeExtensionInRequest,
  #[error("Response does not have an upgrade extension")]
  NoUpgradeExtensionInResponse,
  #[error("Upstream tried to switch to protocol {returned:?} when {requested:?} was requested")]
  UpgradeProtocolMismatch {
    requested: Option<String>,
    returned: Option<String>,
  },

  #[error(transparent)]
  Other(#[from] anyhow::Error),
}

impl From<&HttpError> for StatusCode {
  /// Every per-request failure is answered with a 500 envelope; the variant only
  /// shapes the envelope message, never the status.
  fn from(_e: &HttpError) -> StatusCode {
    StatusCode::INTERNAL_SERVER_ERROR
  }
}
