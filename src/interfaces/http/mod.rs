//! HTTP ingress and the summary/purge endpoints.

pub mod handlers;

use crate::application::aggregator::Aggregator;
use crate::domain::ports::QueueHandle;
use axum::Router;
use axum::routing::{get, post};
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::info;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub queue: QueueHandle,
    pub aggregator: Aggregator,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/payments", post(handlers::create_payment))
        .route("/payments-summary", get(handlers::payments_summary))
        .route(
            "/purge-payments",
            post(handlers::purge_payments).get(handlers::purge_payments),
        )
        .with_state(state)
}

/// Serves `router(state)` on `addr` until `shutdown` resolves.
pub async fn serve<F>(addr: SocketAddr, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(addr).await?;
    info!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}
