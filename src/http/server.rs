//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Wrap the application router with the response pipeline
//! - Wire up middleware (tracing, timeout, request ID)
//! - Bind server to listener and shut down gracefully

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::{middleware, Router};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::PipelineConfig;
use crate::http::middleware::response_pipeline;
use crate::pipeline::{PipelineController, PipelineError};

/// HTTP server hosting an application behind the response pipeline.
pub struct HttpServer {
    router: Router,
    controller: Arc<PipelineController>,
}

impl HttpServer {
    /// Create a new HTTP server around `app`.
    pub fn new(config: PipelineConfig, app: Router) -> Result<Self, PipelineError> {
        let controller = Arc::new(PipelineController::new(Arc::new(config))?);
        let router = Self::build_router(controller.clone(), app);
        Ok(Self { router, controller })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(controller: Arc<PipelineController>, app: Router) -> Router {
        let timeout = Duration::from_secs(controller.config().listener.request_timeout_secs);
        app.layer(middleware::from_fn_with_state(controller, response_pipeline))
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::x_request_id())
                    .layer(TimeoutLayer::new(timeout)),
            )
    }

    /// The fully layered router, for in-process use.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn controller(&self) -> &Arc<PipelineController> {
        &self.controller
    }

    /// Run the server until Ctrl+C.
    pub async fn run(self, listener: TcpListener) -> Result<(), std::io::Error> {
        self.run_until(listener, shutdown_signal()).await
    }

    /// Run the server until `shutdown` completes.
    pub async fn run_until<F>(self, listener: TcpListener, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Wait for shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
