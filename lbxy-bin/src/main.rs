#[global_allocator]
static ALLOC: mimalloc::MiMalloc = mimalloc::MiMalloc;

mod config;
mod constants;
mod error;
mod log;

use crate::{
  config::{build_settings, parse_opts, Opts},
  log::*,
};
use lbxy_lib::entrypoint;

fn main() {
  init_logger();

  let mut runtime_builder = tokio::runtime::Builder::new_multi_thread();
  runtime_builder.enable_all();
  runtime_builder.thread_name("lbxy");
  let runtime = runtime_builder.build().unwrap();

  runtime.block_on(async {
    let Ok(parsed_opts) = parse_opts() else {
      error!("Invalid options");
      std::process::exit(1);
    };

    if let Err(e) = proxy_service(&parsed_opts, runtime.handle().clone()).await {
      error!("lbxy service exited: {e}");
      std::process::exit(1);
    }
  });
}

async fn proxy_service(opts: &Opts, runtime_handle: tokio::runtime::Handle) -> Result<(), anyhow::Error> {
  info!("Start lbxy service");
  let (proxy_conf, backend_conf) = match build_settings(opts) {
    Ok(v) => v,
    Err(e) => {
      error!("Invalid configuration: {e}");
      return Err(e);
    }
  };
  entrypoint(&proxy_conf, &backend_conf, &runtime_handle, None)
    .await
    .map_err(|e| anyhow::anyhow!(e))
}
