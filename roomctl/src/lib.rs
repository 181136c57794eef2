//! # roomctl: upload proxy for an image-editing API
//!
//! `roomctl` sits between a browser upload page and a third-party image-editing API (Photoroom by
//! default). It keeps the API key server-side, rejects bad uploads before they cost an upstream
//! call, shapes the upstream's multipart request, and turns every failure into one JSON envelope
//! the page can display.
//!
//! ## Request Flow
//!
//! A request to `POST /api/remove-bg` or `POST /api/advanced-edit` goes through:
//!
//! 1. **Credentials**: [`Config::upstream_api_key`] checks that a key is configured and, in sandbox
//!    mode, that it is a sandbox key. Nothing else runs without one.
//! 2. **Validation** ([`upload`]): file type per endpoint (HEIC/HEIF is accepted for background
//!    removal only), empty uploads and the size ceiling.
//! 3. **Translation** ([`translate`]): the upload and form fields become an
//!    [`translate::UpstreamRequest`] with the upstream's field names and configured defaults.
//! 4. **Upstream call** ([`upstream`]): one multipart POST with a timeout and no retries.
//! 5. **Response**: the image bytes are relayed with `Cache-Control: no-store`, or the failure is
//!    rendered as an [`errors::ErrorEnvelope`].
//!
//! The proxy holds no state between requests. [`AppState`] carries the configuration, loaded once
//! at startup, and a shared HTTP client.
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use roomctl::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = roomctl::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     roomctl::telemetry::init_telemetry(config.enable_otel_export)?;
//!
//!     let app = Application::new(config)?;
//!     app.serve(async {
//!         tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
//!     })
//!     .await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! See the [`config`] module for configuration options.

pub mod api;
pub mod config;
pub mod errors;
mod static_assets;
pub mod telemetry;
pub mod translate;
pub mod upload;
pub mod upstream;

#[cfg(test)]
mod test_utils;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use bon::Builder;
pub use config::Config;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, debug, info, instrument};
use upstream::UpstreamClient;

/// Application state shared across all request handlers.
///
/// ```ignore
/// let state = AppState::builder()
///     .config(Arc::new(config))
///     .upstream(upstream)
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Arc<Config>,
    pub upstream: UpstreamClient,
}

/// Build the application router.
///
/// - `GET /healthz`
/// - `GET /api/demo-info`
/// - `POST /api/remove-bg` and `POST /api/advanced-edit`, with the request body limit raised to
///   [`Config::request_body_limit`]
/// - Embedded upload page for everything else
#[instrument(skip_all)]
pub fn build_router(state: &AppState) -> Router {
    let upload_limit = DefaultBodyLimit::max(state.config.request_body_limit());

    let api_routes = Router::new()
        .route("/demo-info", get(api::handlers::demo_info::get_demo_info))
        .route(
            "/remove-bg",
            post(api::handlers::images::remove_background).layer(upload_limit),
        )
        .route(
            "/advanced-edit",
            post(api::handlers::images::advanced_edit).layer(upload_limit),
        )
        .with_state(state.clone());

    let fallback = get(api::handlers::static_assets::serve_embedded_asset);

    Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .nest("/api", api_routes)
        .fallback_service(fallback)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}

/// The proxy server.
///
/// 1. **Create**: [`Application::new`] builds the HTTP client and router
/// 2. **Serve**: [`Application::serve`] binds to the configured address and handles requests until
///    the shutdown future resolves
pub struct Application {
    router: Router,
    config: Arc<Config>,
}

impl Application {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting roomctl with configuration: {:#?}", config);

        if config.api_key.is_none() {
            tracing::warn!("No upstream API key configured; upload endpoints will answer missing_api_key");
        }

        let upstream = UpstreamClient::new(&config.upstream)?;
        let config = Arc::new(config);
        let app_state = AppState::builder().config(config.clone()).upstream(upstream).build();
        let router = build_router(&app_state);

        Ok(Self { router, config })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router).expect("Failed to create test server")
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "roomctl listening on http://{}, available at http://localhost:{}",
            bind_addr, self.config.port
        );

        axum::serve(listener, self.router).with_graceful_shutdown(shutdown).await?;

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}
