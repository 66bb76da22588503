//! Progress server
//!
//! Serves the read-only progress query over any [`ProgressSource`]. The
//! orchestrator binary runs it in-process so reads see the live store.

use axum::{
    extract::{Path, State},
    response::Json,
    routing::get,
    Router,
};
use chrono::Utc;
use serde_json::{json, Value};
use shared::{JobKey, ProgressResponse, ProgressSource};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, info};

use crate::error::{WebServerError, WebServerResult};

pub struct ProgressServer<P: ProgressSource> {
    source: Arc<P>,
}

impl<P: ProgressSource> Clone for ProgressServer<P> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
        }
    }
}

impl<P: ProgressSource + 'static> ProgressServer<P> {
    pub fn new(source: Arc<P>) -> Self {
        Self { source }
    }

    /// Build the Axum router with all routes
    pub fn build_router(&self) -> Router {
        Router::new()
            .route("/dossier/progress/:target/:disease", get(progress_handler::<P>))
            .route("/health", get(health_check))
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(CorsLayer::permissive())
                    .into_inner(),
            )
            .with_state(self.clone())
    }

    /// Serve until `shutdown` resolves
    pub async fn serve<S>(&self, address: SocketAddr, shutdown: S) -> WebServerResult<()>
    where
        S: Future<Output = ()> + Send + 'static,
    {
        let listener = tokio::net::TcpListener::bind(address)
            .await
            .map_err(|e| WebServerError::ServerStartupFailed {
                address: address.to_string(),
                message: e.to_string(),
            })?;
        info!(
            component = "webserver",
            "🌐 Progress endpoint listening on http://{}/dossier/progress/<target>/<disease>",
            address
        );

        axum::serve(listener, self.build_router())
            .with_graceful_shutdown(shutdown)
            .await?;
        info!(component = "webserver", "🛑 Progress endpoint stopped");
        Ok(())
    }
}

async fn progress_handler<P: ProgressSource + 'static>(
    State(server): State<ProgressServer<P>>,
    Path((target, disease)): Path<(String, String)>,
) -> WebServerResult<Json<ProgressResponse>> {
    let key = JobKey::new(target, disease);
    debug!(component = "webserver", job = %key, "Progress requested");
    match server.source.progress(&key).await? {
        Some(snapshot) => Ok(Json(ProgressResponse::from(snapshot))),
        None => Err(WebServerError::JobNotFound {
            job: key.to_string(),
        }),
    }
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().timestamp(),
    }))
}
