//! HTTP gateway for the cruise-to-report pipeline: bearer-token auth,
//! multipart intake, one synchronous pipeline pass per request, artifact
//! links out.

mod config;
mod error;
mod routes;
mod state;

use anyhow::Result;
use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::info;

pub use config::ApiConfig;
pub use error::ApiError;
pub use routes::{ImportSummary, ProcessResponse};
pub use state::AppState;

pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config);
    let body_limit = DefaultBodyLimit::max(state.config.max_upload_bytes);

    Router::new()
        .route("/api/process", post(routes::process))
        .route("/download/{run_id}/{filename}", get(routes::download))
        .route("/health", get(routes::health))
        .layer(cors)
        .layer(body_limit)
        .with_state(state)
}

fn cors_layer(config: &ApiConfig) -> CorsLayer {
    if config.allowed_origins.is_empty() {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

pub async fn serve(config: ApiConfig) -> Result<()> {
    tokio::fs::create_dir_all(&config.uploads_dir).await?;
    tokio::fs::create_dir_all(&config.outputs_dir).await?;

    let port = config.port;
    let state = AppState::new(config)?;
    let router = build_router(state);

    let listener = TcpListener::bind((std::net::Ipv4Addr::UNSPECIFIED, port)).await?;
    info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, router.into_make_service()).await?;

    Ok(())
}
