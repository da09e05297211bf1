use crate::handlers;
use axum::{routing::get, Router};
use ironmaker_engine::EngineContext;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Read-only monitoring surface over the running engine. Nothing here
/// mutates engine state; operators intervene through config and restarts.
pub struct ApiServer {
    ctx: Arc<EngineContext>,
}

impl ApiServer {
    #[must_use]
    pub const fn new(ctx: Arc<EngineContext>) -> Self {
        Self { ctx }
    }

    pub fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        Router::new()
            .route("/health", get(handlers::health))
            .route("/api/quotes", get(handlers::quotes))
            .route("/api/metrics", get(handlers::metrics))
            .layer(cors)
            .layer(TraceLayer::new_for_http())
            .with_state(self.ctx.clone())
    }

    /// Binds and serves until the process exits.
    ///
    /// # Errors
    /// Returns an error if the listener fails to bind or the server fails
    /// while serving.
    pub async fn serve(self, addr: &str) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("monitoring API listening on {}", addr);

        axum::serve(listener, self.router()).await?;

        Ok(())
    }
}
