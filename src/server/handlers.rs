//! HTTP request handlers

use super::range::ByteRange;
use super::AppState;
use crate::cache::CacheStats;
use crate::derivation::Intent;
use crate::error::OrchestratorError;
use crate::orchestrator::{Origin, Resolved, ServedFile};
use axum::body::{Body, Bytes};
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use std::io::SeekFrom;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt};
use tracing::{debug, error};

/// Header telling clients how a file was produced
pub const DERIVATION_HEADER: &str = "x-webmedia-derivation";

const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Default, Deserialize)]
pub struct IntentQuery {
    pub intent: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub mode: String,
    pub transcoding: bool,
    pub cache: CacheStats,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

/// Error answered to a client: status plus a stable reason code
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    reason: &'static str,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, reason: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            reason,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "io_error", message)
    }
}

impl From<OrchestratorError> for ApiError {
    fn from(err: OrchestratorError) -> Self {
        let (code, reason) = err.status();
        let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        // tool diagnostics stay in the log
        let message = match &err {
            OrchestratorError::DerivationFailed(_) => "derivation unavailable".to_string(),
            OrchestratorError::Io(_) => "internal error".to_string(),
            other => other.to_string(),
        };
        if status.is_server_error() {
            error!("{}", err);
        }
        Self::new(status, reason, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.reason,
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

/// Health check endpoint
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        mode: state.orchestrator.policy().mode.to_string(),
        transcoding: state.orchestrator.can_transcode(),
        cache: state.orchestrator.cache().stats(),
    })
}

/// `GET /` lists the served root
pub async fn root(
    State(state): State<AppState>,
    Query(query): Query<IntentQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let intent = parse_intent(query.intent.as_deref())?;
    respond(&state, "", intent, &headers).await
}

/// `GET /{*path}` with an optional `?intent=`
pub async fn file(
    State(state): State<AppState>,
    Path(path): Path<String>,
    Query(query): Query<IntentQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let intent = parse_intent(query.intent.as_deref())?;
    respond(&state, &path, intent, &headers).await
}

/// `GET /__thumbs__/{*path}`
pub async fn thumbnail(
    State(state): State<AppState>,
    Path(path): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    respond(&state, &path, Intent::Thumbnail, &headers).await
}

fn parse_intent(raw: Option<&str>) -> Result<Intent, ApiError> {
    match raw {
        None | Some("") => Ok(Intent::default()),
        Some(raw) => raw
            .parse()
            .map_err(|e: String| ApiError::new(StatusCode::BAD_REQUEST, "bad_intent", e)),
    }
}

async fn respond(
    state: &AppState,
    path: &str,
    intent: Intent,
    headers: &HeaderMap,
) -> Result<Response, ApiError> {
    debug!("Resolving {:?} as {}", path, intent);
    match state.orchestrator.resolve(path, intent).await? {
        Resolved::File(file) => send_file(file, headers).await,
        Resolved::Tags(tags) => Ok(Json(tags).into_response()),
        Resolved::Directory(listing) => Ok(Json(listing).into_response()),
    }
}

async fn send_file(served: ServedFile, headers: &HeaderMap) -> Result<Response, ApiError> {
    let io = |e: std::io::Error| ApiError::internal(format!("{}: {}", served.path.display(), e));

    let mut file = tokio::fs::File::open(&served.path).await.map_err(io)?;
    // the file may have changed since it was resolved
    let len = file.metadata().await.map_err(io)?.len();

    let range_header = headers.get(header::RANGE).and_then(|v| v.to_str().ok());
    let range = ByteRange::parse(range_header, len);

    let status = match range {
        ByteRange::Full => StatusCode::OK,
        ByteRange::Partial { .. } => StatusCode::PARTIAL_CONTENT,
        ByteRange::Unsatisfiable => StatusCode::RANGE_NOT_SATISFIABLE,
    };

    let mut builder = Response::builder()
        .status(status)
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::CONTENT_LENGTH, range.body_len(len));
    if let Some(content_range) = range.content_range(len) {
        builder = builder.header(header::CONTENT_RANGE, content_range);
    }
    if status != StatusCode::RANGE_NOT_SATISFIABLE {
        builder = builder.header(header::CONTENT_TYPE, served.content_type);
    }
    match (served.origin, served.kind) {
        (Origin::Fallback, _) => {
            builder = builder.header(DERIVATION_HEADER, HeaderValue::from_static("fallback"));
        }
        (Origin::Derived, Some(kind)) => {
            builder = builder.header(DERIVATION_HEADER, kind.tag());
        }
        _ => {}
    }

    let body = match range {
        ByteRange::Full => Body::from_stream(chunks(file, len)),
        ByteRange::Partial { start, end } => {
            file.seek(SeekFrom::Start(start)).await.map_err(io)?;
            Body::from_stream(chunks(file, end - start + 1))
        }
        ByteRange::Unsatisfiable => Body::empty(),
    };

    builder
        .body(body)
        .map_err(|e| ApiError::internal(format!("building response: {e}")))
}

/// Stream at most `len` bytes of `reader` in fixed-size chunks
fn chunks<R>(reader: R, len: u64) -> impl Stream<Item = std::io::Result<Bytes>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    stream::unfold(Some(reader.take(len)), |state| async move {
        let mut reader = state?;
        let mut buf = vec![0u8; CHUNK_SIZE];
        match reader.read(&mut buf).await {
            Ok(0) => None,
            Ok(n) => {
                buf.truncate(n);
                Some((Ok(Bytes::from(buf)), Some(reader)))
            }
            Err(e) => Some((Err(e), None)),
        }
    })
}
