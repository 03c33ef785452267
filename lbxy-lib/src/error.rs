use thiserror::Error;

pub type LbxyResult<T> = std::result::Result<T, LbxyError>;

/// Describes things that can go wrong in lbxy
#[derive(Debug, Error)]
pub enum LbxyError {
  // general errors
  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),

  // backend errors
  #[error("Invalid upstream destination: {0}")]
  InvalidUpstreamDestination(String),
  #[error("Unknown load balance policy: {0}")]
  UnknownLoadBalancePolicy(String),
  #[error("Failed to build upstream group: {0}")]
  FailedToBuildUpstreamGroup(#[from] crate::backend::UpstreamGroupBuilderError),

  // handler errors
  #[error("Failed to build message handler: {0}")]
  FailedToBuildMessageHandler(#[from] crate::message_handler::HttpMessageHandlerBuilderError),
  #[error("Failed to build error envelope: {0}")]
  FailedToBuildErrorEnvelope(#[from] serde_json::Error),
  #[error("Invalid http message: {0}")]
  InvalidHttpMessage(#[from] http::Error),
  #[error("Failed to upgrade request: {0}")]
  FailedToUpgradeRequest(String),
  #[error("Failed to upgrade response: {0}")]
  FailedToUpgradeResponse(String),
  #[error("Failed to copy bidirectional for upgraded connections: {0}")]
  FailedToCopyBidirectional(String),

  // forwarder errors
  #[error("Failed to fetch from upstream: {0}")]
  FailedToFetchFromUpstream(String),

  // Others
  #[error("Infallible")]
  Infallible(#[from] std::convert::Infallible),
}
