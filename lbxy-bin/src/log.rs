pub use tracing::{error, info, warn};

pub fn init_logger() {
  use tracing_subscriber::{fmt, prelude::*, EnvFilter};

  let format_layer = fmt::layer()
    .with_line_number(false)
    .with_thread_ids(false)
    .with_thread_names(true)
    .with_target(true)
    .with_level(true)
    .compact();

  let level_string = std::env::var(EnvFilter::DEFAULT_ENV).unwrap_or_else(|_| "info".to_string());
  let filter_layer = EnvFilter::try_new(level_string).unwrap_or_else(|_| EnvFilter::new("info"));

  tracing_subscriber::registry()
    .with(format_layer)
    .with(filter_layer)
    .init();
}
