pub mod documents;
pub mod routes;

use std::future::Future;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::info;

pub use routes::{
  AppState,
  router
};

/// Serves `/todos` on `listener` until
/// `shutdown` resolves.
pub async fn serve<F>(
  listener: TcpListener,
  state: AppState,
  shutdown: F
) -> anyhow::Result<()>
where
  F: Future<Output = ()>
    + Send
    + 'static
{
  let addr = listener
    .local_addr()
    .context(
      "listener has no local address"
    )?;
  info!(%addr, "sprig server listening");

  axum::serve(listener, router(state))
    .with_graceful_shutdown(shutdown)
    .await
    .context("task server error")?;

  info!("sprig server stopped");
  Ok(())
}
