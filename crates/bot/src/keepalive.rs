use std::sync::Arc;

use anyhow::{Context as _, Result};
use axum::{Router, extract::State, routing::get};
use tokio::net::TcpListener;

async fn status(State(status): State<Arc<str>>) -> String {
    status.as_ref().to_owned()
}

pub(crate) fn router(status_text: impl Into<Arc<str>>) -> Router {
    Router::new()
        .route("/", get(status))
        .with_state(status_text.into())
}

/// Serves the keep-alive route until the listener fails.
pub(crate) async fn serve(listener: TcpListener, status_text: impl Into<Arc<str>>) -> Result<()> {
    axum::serve(listener, router(status_text))
        .await
        .context("keep-alive server stopped")
}
