//! HTTP gateway with range request support

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Router,
};
use tokio::net::TcpListener;
use torrent::{FileSelector, SwarmEngine};
use tower_http::trace::TraceLayer;

use crate::body::stream_body;
use crate::listing::{playlist, SwarmStatus};
use crate::range::parse_range;
use crate::state::{GatewayOptions, ServerState};

const ALLOWED_METHODS: &str = "POST, GET, OPTIONS";
const PREFLIGHT_MAX_AGE: &str = "1728000";
const DLNA_TRANSFER_MODE: &str = "transferMode.dlna.org";
const DLNA_CONTENT_FEATURES: &str = "contentFeatures.dlna.org";
const DLNA_FEATURES: &str = "DLNA.ORG_OP=01;DLNA.ORG_CI=0;DLNA.ORG_FLAGS=01700000000000000000000000000000";
const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";
const M3U_CONTENT_TYPE: &str = "application/x-mpegurl; charset=utf-8";

/// HTTP gateway serving the files of one torrent
#[derive(Clone)]
pub struct FileServerApi {
    state: ServerState,
}

impl FileServerApi {
    /// Create a new gateway
    ///
    /// # Arguments
    /// * `engine` - Swarm engine the files are read from
    /// * `selector` - Owner of the primary file served at `/`
    /// * `options` - Listing and streaming options
    pub fn new(
        engine: Arc<dyn SwarmEngine>,
        selector: Arc<FileSelector>,
        options: GatewayOptions,
    ) -> Self {
        Self {
            state: ServerState::new(engine, selector, options),
        }
    }

    /// Get the server state
    pub fn state(&self) -> &ServerState {
        &self.state
    }

    /// Create the axum router; every request goes through one handler
    pub fn router(&self) -> Router {
        Router::new()
            .fallback(handle_request)
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http())
    }

    /// Bind `host:port`, falling back to an ephemeral port if that fails
    pub async fn bind(host: &str, port: u16) -> crate::Result<TcpListener> {
        match TcpListener::bind((host, port)).await {
            Ok(listener) => Ok(listener),
            Err(e) => {
                tracing::warn!("Could not bind {}:{} ({}), using a random port", host, port, e);
                Ok(TcpListener::bind((host, 0)).await?)
            }
        }
    }

    /// Serve on `listener` until `shutdown` resolves
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> crate::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr: SocketAddr = listener.local_addr()?;
        tracing::info!("File server listening on {}", addr);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await?;

        Ok(())
    }
}

async fn handle_request(
    State(state): State<ServerState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    if method == Method::OPTIONS {
        if let Some(requested) = headers.get(header::ACCESS_CONTROL_REQUEST_HEADERS) {
            return preflight(&headers, requested);
        }
    }

    let mut response = route(&state, &method, uri.path(), &headers)
        .await
        .unwrap_or_else(IntoResponse::into_response);

    if let Some(origin) = headers.get(header::ORIGIN) {
        response
            .headers_mut()
            .insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
    }
    response
}

fn preflight(headers: &HeaderMap, requested: &HeaderValue) -> Response {
    let mut response = StatusCode::OK.into_response();
    let out = response.headers_mut();
    if let Some(origin) = headers.get(header::ORIGIN) {
        out.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
    }
    out.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(ALLOWED_METHODS),
    );
    out.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, requested.clone());
    out.insert(
        header::ACCESS_CONTROL_MAX_AGE,
        HeaderValue::from_static(PREFLIGHT_MAX_AGE),
    );
    response
}

async fn route(
    state: &ServerState,
    method: &Method,
    path: &str,
    headers: &HeaderMap,
) -> Result<Response, AppError> {
    let path = state.normalize_path(path);
    let host = headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("localhost");

    match path.as_str() {
        "/favicon.ico" => Err(AppError::NotFound),
        "/.json" => status(state, host).await,
        "/.m3u" => Ok((
            [(header::CONTENT_TYPE, M3U_CONTENT_TYPE)],
            playlist(&state.listed_files(), host),
        )
            .into_response()),
        _ => stream_file(state, method, &path, headers).await,
    }
}

/// Status snapshot as pretty-printed JSON
async fn status(state: &ServerState, host: &str) -> Result<Response, AppError> {
    let stats = state
        .engine()
        .stats()
        .await
        .map_err(|e| AppError::Internal(format!("Failed to read swarm stats: {}", e)))?;

    let status = SwarmStatus::new(&state.listed_files(), &stats, host);
    let json = serde_json::to_string_pretty(&status)
        .map_err(|e| AppError::Internal(format!("Failed to encode status: {}", e)))?;

    Ok(([(header::CONTENT_TYPE, JSON_CONTENT_TYPE)], json).into_response())
}

/// Stream one file, honouring a single byte range
async fn stream_file(
    state: &ServerState,
    method: &Method,
    path: &str,
    headers: &HeaderMap,
) -> Result<Response, AppError> {
    let index = path
        .strip_prefix('/')
        .and_then(|p| p.parse::<usize>().ok())
        .ok_or(AppError::NotFound)?;
    let file = state
        .engine()
        .files()
        .into_iter()
        .nth(index)
        .ok_or(AppError::NotFound)?;

    let range = headers
        .get(header::RANGE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| parse_range(value, file.length));

    let builder = Response::builder()
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::CONTENT_TYPE, state.content_type(&file.name))
        .header(DLNA_TRANSFER_MODE, "Streaming")
        .header(DLNA_CONTENT_FEATURES, DLNA_FEATURES);

    let builder = match range {
        Some(range) => builder
            .status(StatusCode::PARTIAL_CONTENT)
            .header(header::CONTENT_LENGTH, range.len())
            .header(
                header::CONTENT_RANGE,
                format!("bytes {}-{}/{}", range.start, range.end, file.length),
            ),
        None => builder
            .status(StatusCode::OK)
            .header(header::CONTENT_LENGTH, file.length),
    };

    if method == Method::HEAD {
        return builder
            .body(Body::empty())
            .map_err(|e| AppError::Internal(format!("Failed to build response: {}", e)));
    }

    let source = state
        .engine()
        .open(index, range)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to open file #{}: {}", index, e)))?;

    builder
        .body(stream_body(source, state.options().idle_timeout))
        .map_err(|e| AppError::Internal(format!("Failed to build response: {}", e)))
}

/// Application error types
#[derive(Debug)]
enum AppError {
    NotFound,
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::NotFound => StatusCode::NOT_FOUND.into_response(),
            AppError::Internal(msg) => {
                tracing::error!("{}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg).into_response()
            }
        }
    }
}
