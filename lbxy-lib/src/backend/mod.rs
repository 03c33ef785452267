mod load_balance;
mod upstream;

pub use load_balance::load_balance_options;
pub use upstream::{Upstream, UpstreamGroup, UpstreamGroupBuilderError};
