//! HTTP server for the scrape endpoint.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use junos_common::Desc;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tracing::{debug, info};

use crate::config::ExporterConfig;
use crate::exposition::{self, CONTENT_TYPE};
use crate::mapper::Emitter;
use crate::netconf::Connector;
use crate::scheduler::Scheduler;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    config: Arc<ExporterConfig>,
    scheduler: Arc<Scheduler>,
    connector: Arc<dyn Connector>,
    up: Arc<Desc>,
}

impl AppState {
    pub fn new(
        config: Arc<ExporterConfig>,
        scheduler: Arc<Scheduler>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self {
            config,
            scheduler,
            connector,
            up: Desc::bare(
                "up",
                "Whether the Junos device could be reached (1 = yes, 0 = no).",
                &[],
            ),
        }
    }
}

/// Query parameters of a scrape request.
#[derive(Debug, Default, Deserialize)]
struct ScrapeParams {
    #[serde(default)]
    config: String,
    #[serde(default)]
    target: String,
}

/// Create the HTTP router.
pub fn create_router(state: AppState, metrics_path: &str) -> Router {
    let index = index_page(metrics_path);

    Router::new()
        .route("/", get(move || async move { Html(index) }))
        .route(metrics_path, get(metrics_handler))
        .route("/health", get(|| async { HEALTHY }))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn index_page(metrics_path: &str) -> String {
    format!(
        r#"<html>
<head><title>Junos Exporter</title></head>
<body>
<h1>Junos Exporter</h1>
<p><a href="{metrics_path}?config=default&amp;target=router.example.net">{metrics_path}?config=default&amp;target=router.example.net</a></p>
</body>
</html>
"#
    )
}

/// Handler for the scrape endpoint.
async fn metrics_handler(
    State(state): State<AppState>,
    Query(params): Query<ScrapeParams>,
) -> Response {
    let target = match state.config.resolve(&params.config, &params.target) {
        Ok(target) => target,
        Err(e) => {
            debug!(config = %params.config, target = %params.target, error = %e, "rejected scrape request");
            return (StatusCode::BAD_REQUEST, format!("{e}\n")).into_response();
        }
    };

    let scrape = state.scheduler.scrape(&target, state.connector.as_ref()).await;

    let mut emitter = Emitter::new();
    emitter.flag(&state.up, scrape.is_up(), &[] as &[&str]);
    let mut samples = scrape.samples;
    samples.extend(emitter.into_samples());

    (
        StatusCode::OK,
        [("content-type", CONTENT_TYPE)],
        exposition::render(&samples),
    )
        .into_response()
}

/// Body of the liveness endpoint; scraping devices is not needed to answer it.
const HEALTHY: &str = concat!("junos-exporter ", env!("CARGO_PKG_VERSION"), " healthy\n");

/// HTTP server configuration.
pub struct HttpServer {
    state: AppState,
    listen_addr: SocketAddr,
    metrics_path: String,
}

impl HttpServer {
    /// Create a new HTTP server.
    pub fn new(state: AppState, listen_addr: SocketAddr, metrics_path: String) -> Self {
        Self {
            state,
            listen_addr,
            metrics_path,
        }
    }

    /// Bind the listen address and serve until the shutdown signal is received.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.listen_addr)
            .await
            .with_context(|| format!("Failed to bind to {}", self.listen_addr))?;

        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener.
    ///
    /// Stops accepting scrapes once `true` is sent on `shutdown` or its sender
    /// is dropped, then waits for in-flight scrapes to finish.
    pub async fn serve(
        self,
        listener: TcpListener,
        mut shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<()> {
        info!(
            addr = %listener.local_addr()?,
            path = %self.metrics_path,
            "Serving Junos metrics"
        );

        let router = create_router(self.state, &self.metrics_path);
        let stop = async move {
            // a dropped sender also means stop
            let _ = shutdown.wait_for(|stop| *stop).await;
            info!("No longer accepting scrapes");
        };

        axum::serve(listener, router)
            .with_graceful_shutdown(stop)
            .await
            .context("HTTP server error")?;

        info!("HTTP server stopped");
        Ok(())
    }
}
