/// Same-origin API for the listener front ends.
///
/// Serves five JSON routes and falls back to static files for everything
/// else:
///
/// • `GET  /api/user-ip`         the caller's address as this server sees it
/// • `GET  /api/metadata`        now-playing JSON from the stream CDN
/// • `GET  /api/data`            passthrough to the upstream API
/// • `POST /api/tracks/like`     validated, forwarded to the upstream API
/// • `POST /api/tracks/is-liked` validated, forwarded to the upstream API
///
/// Upstream JSON is returned untouched. Any upstream failure collapses to a
/// 500 with a fixed message so listeners never see transport details.
use std::net::SocketAddr;
use std::path::Path;

use anyhow::Context;
use axum::extract::rejection::JsonRejection;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use reqwest::Client;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use elgean_proto::config::ServerConfig;
use elgean_proto::protocol::{
    ErrorResponse, LikeRequest, UserIpResponse, DATA_PATH, IS_LIKED_PATH, LIKE_PATH,
    METADATA_PATH, STATUS_SUCCESS, USER_IP_PATH,
};

const LIKE_FAILED: &str = "Failed to like track";
const CHECK_FAILED: &str = "Failed to check like status";
const METADATA_FAILED: &str = "Failed to fetch metadata";
const DATA_FAILED: &str = "Failed to fetch data from API";
const UNKNOWN_ADDRESS: &str = "unknown";

// ── Shared state ──────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct ProxyState {
    pub client: Client,
    pub upstream_url: String,
    pub metadata_url: String,
}

impl ProxyState {
    pub fn new(config: &ServerConfig) -> anyhow::Result<Self> {
        let timeout = config.request_timeout();
        let client = Client::builder()
            .user_agent(concat!("elgean-server/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .context("failed to build reqwest client for proxy")?;

        Ok(Self {
            client,
            upstream_url: config.upstream_url.trim_end_matches('/').to_string(),
            metadata_url: config.metadata_url.clone(),
        })
    }
}

// ── Address lookup ────────────────────────────────────────────────────────────

/// First `X-Forwarded-For` entry, then `X-Real-IP`, then the socket peer.
pub fn client_address(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    if let Some(first) = header("x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return first.to_string();
    }
    if let Some(real) = header("x-real-ip") {
        return real.to_string();
    }
    peer.map(|p| p.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_ADDRESS.to_string())
}

async fn user_ip(
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
) -> Json<UserIpResponse> {
    let ip = client_address(&headers, peer.map(|ConnectInfo(addr)| addr));
    debug!("user-ip → {}", ip);
    Json(UserIpResponse {
        status: Some(STATUS_SUCCESS.to_string()),
        ip: Some(ip),
    })
}

// ── Passthrough routes ────────────────────────────────────────────────────────

async fn fetch_json(client: &Client, url: &str) -> anyhow::Result<Value> {
    let response = client.get(url).send().await?.error_for_status()?;
    Ok(response.json().await?)
}

async fn metadata(State(state): State<ProxyState>) -> Response {
    match fetch_json(&state.client, &state.metadata_url).await {
        Ok(body) => Json(body).into_response(),
        Err(e) => {
            warn!("metadata fetch from {} failed: {:#}", state.metadata_url, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": METADATA_FAILED })),
            )
                .into_response()
        }
    }
}

async fn data(State(state): State<ProxyState>) -> Response {
    let url = format!("{}{}", state.upstream_url, DATA_PATH);
    match fetch_json(&state.client, &url).await {
        Ok(body) => Json(body).into_response(),
        Err(e) => {
            warn!("upstream data fetch failed: {:#}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": DATA_FAILED })),
            )
                .into_response()
        }
    }
}

// ── Like routes ───────────────────────────────────────────────────────────────

fn like_failure(message: &'static str) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::new(message)),
    )
        .into_response()
}

async fn forward_like(
    state: &ProxyState,
    path: &str,
    payload: Result<Json<LikeRequest>, JsonRejection>,
    failure: &'static str,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            debug!("{}: unreadable body: {}", path, rejection);
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new(rejection.body_text())),
            )
                .into_response();
        }
    };
    if let Some(message) = request.validation_error() {
        return (StatusCode::BAD_REQUEST, Json(ErrorResponse::new(message))).into_response();
    }

    let url = format!("{}{}", state.upstream_url, path);
    let upstream = match state.client.post(&url).json(&request).send().await {
        Ok(r) => r,
        Err(e) => {
            warn!("{} upstream request failed: {}", path, e);
            return like_failure(failure);
        }
    };

    let status = upstream.status();
    if !status.is_success() && !status.is_client_error() {
        warn!("{} upstream returned {}", path, status);
        return like_failure(failure);
    }

    match upstream.json::<Value>().await {
        Ok(body) => {
            debug!("{} {} → {}", path, request.track_identifier, status);
            (status, Json(body)).into_response()
        }
        Err(e) => {
            warn!("{} upstream sent an unreadable body: {}", path, e);
            like_failure(failure)
        }
    }
}

async fn like(
    State(state): State<ProxyState>,
    payload: Result<Json<LikeRequest>, JsonRejection>,
) -> Response {
    forward_like(&state, LIKE_PATH, payload, LIKE_FAILED).await
}

async fn is_liked(
    State(state): State<ProxyState>,
    payload: Result<Json<LikeRequest>, JsonRejection>,
) -> Response {
    forward_like(&state, IS_LIKED_PATH, payload, CHECK_FAILED).await
}

// ── Server startup ────────────────────────────────────────────────────────────

pub fn router(state: ProxyState, static_dir: &Path) -> Router {
    Router::new()
        .route(USER_IP_PATH, get(user_ip))
        .route(METADATA_PATH, get(metadata))
        .route(DATA_PATH, get(data))
        .route(LIKE_PATH, post(like))
        .route(IS_LIKED_PATH, post(is_liked))
        .fallback_service(ServeDir::new(static_dir))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// Bind and serve until `shutdown` fires. Bind errors are returned to the
/// caller; serve errors after that are logged.
pub async fn start_server(
    config: &ServerConfig,
    shutdown: CancellationToken,
) -> anyhow::Result<tokio::task::JoinHandle<()>> {
    let state = ProxyState::new(config)?;
    let app = router(state, &config.static_dir);

    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Elgean server listening on http://{}", addr);
    info!("Upstream API at {}", config.upstream_url);

    Ok(tokio::spawn(async move {
        let serve = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move { shutdown.cancelled().await });
        if let Err(e) = serve.await {
            warn!("server error: {}", e);
        }
    }))
}
