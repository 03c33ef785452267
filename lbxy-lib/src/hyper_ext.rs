use http_body_util::{combinators, BodyExt, Either, Full};
use hyper::body::{Bytes, Incoming};
use tokio::runtime::Handle;

/// Type for synthetic boxed body
pub(crate) type BoxBody = combinators::BoxBody<Bytes, hyper::Error>;
/// Type for either passthrough body or synthetic boxed body
pub(crate) type IncomingOr<B> = Either<Incoming, B>;

/// Request body type flowing through the message handler: the real `Incoming`
/// in production, a synthetic body in tests
pub(crate) type RequestBody = IncomingOr<BoxBody>;
/// Response body type emitted by the message handler: upstream passthrough or
/// a synthetic (error envelope) body
pub(crate) type ResponseBody = IncomingOr<BoxBody>;

/// helper function to build a full body
pub(crate) fn full(body: Bytes) -> BoxBody {
  Full::new(body).map_err(|never| match never {}).boxed()
}

#[derive(Clone)]
/// Executor for hyper to spawn futures onto the shared runtime handle
pub struct LocalExecutor {
  runtime_handle: Handle,
}

impl LocalExecutor {
  pub fn new(runtime_handle: Handle) -> Self {
    LocalExecutor { runtime_handle }
  }
}

impl<F> hyper::rt::Executor<F> for LocalExecutor
where
  F: std::future::Future + Send + 'static,
  F::Output: Send,
{
  fn execute(&self, fut: F) {
    self.runtime_handle.spawn(fut);
  }
}
