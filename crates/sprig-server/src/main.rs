use std::net::{
  IpAddr,
  SocketAddr
};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use sprig_server::AppState;
use sprig_server::documents::JsonFileStore;
use tokio::net::TcpListener;
use tracing::{
  error,
  info,
  warn
};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{
  EnvFilter,
  fmt
};

#[derive(Parser, Debug)]
#[command(
  name = "sprig-server",
  version,
  about = "HTTP task server for sprig"
)]
struct Args {
  #[arg(
    long,
    env = "PORT",
    default_value_t = 5001
  )]
  port: u16,

  #[arg(
    long,
    default_value = "0.0.0.0"
  )]
  bind: IpAddr,

  /// Directory holding the document
  /// store.
  #[arg(
    long,
    env = "SPRIG_SERVER_DATA",
    default_value = "./.sprig_server_data"
  )]
  data: PathBuf
}

fn init_tracing() {
  let filter =
    EnvFilter::try_from_default_env()
      .or_else(|_| {
        EnvFilter::try_new(
          "info,sprig_server=debug"
        )
      })
      .unwrap_or_else(|_| {
        EnvFilter::new("info")
      });

  let _ =
    tracing_subscriber::registry()
      .with(filter)
      .with(
        fmt::layer()
          .with_target(true)
          .with_line_number(true)
      )
      .try_init();
}

#[tokio::main]
async fn main() {
  init_tracing();
  let args = Args::parse();

  info!(?args, "starting sprig server");

  if let Err(err) = run(args).await {
    error!(error = %format!("{err:#}"), "server failed");
    eprintln!("error: {err:#}");
    std::process::exit(1);
  }
}

async fn run(
  args: Args
) -> anyhow::Result<()> {
  let store =
    JsonFileStore::open(&args.data)
      .with_context(|| {
        format!(
          "failed to open document \
           store at {}",
          args.data.display()
        )
      })?;

  let addr =
    SocketAddr::new(args.bind, args.port);
  let listener =
    TcpListener::bind(addr)
      .await
      .with_context(|| {
        format!("failed to bind {addr}")
      })?;

  sprig_server::serve(
    listener,
    AppState::new(Arc::new(store)),
    wait_for_shutdown_signal()
  )
  .await
}

async fn wait_for_shutdown_signal() {
  if let Err(error) =
    tokio::signal::ctrl_c().await
  {
    error!(
      %error,
      "failed to listen for ctrl_c; \
       running until killed"
    );
    std::future::pending::<()>().await;
  }
  warn!(
    "received shutdown signal; \
     stopping server"
  );
}
