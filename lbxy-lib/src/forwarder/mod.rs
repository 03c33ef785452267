mod client;

use crate::hyper_ext::RequestBody;
use hyper_util::client::legacy::connect::HttpConnector;

/// The upstream transport collaborator used by the message handler: a plain
/// cleartext http client, since TLS to upstreams is out of scope here.
pub type Forwarder = client::Forwarder<HttpConnector, RequestBody>;

pub(crate) use client::ForwardRequest;
