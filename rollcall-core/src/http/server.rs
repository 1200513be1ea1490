//! HTTP server for the link endpoints and the join webhook

use super::api::build_router;
use super::state::AppState;
use crate::shutdown::ShutdownCoordinator;
use anyhow::Result;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// The public HTTP surface
pub struct HttpServer {
    state: Arc<AppState>,
    addr: String,
}

impl HttpServer {
    pub fn new(state: Arc<AppState>, addr: impl Into<String>) -> Self {
        Self {
            state,
            addr: addr.into(),
        }
    }

    /// Serve until shutdown is triggered
    pub async fn run(self, shutdown: Arc<ShutdownCoordinator>) -> Result<()> {
        let router = build_router(self.state);

        let listener = TcpListener::bind(&self.addr).await?;
        info!("HTTP server listening on {}", self.addr);

        axum::serve(listener, router)
            .with_graceful_shutdown(async move { shutdown.wait().await })
            .await?;

        Ok(())
    }
}
