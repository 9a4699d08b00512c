//! OTLP/HTTP receiver
//!
//! Decodes `POST /v1/traces`, `/v1/logs` and `/v1/metrics` bodies, either
//! `application/x-protobuf` or `application/json`, and hands them to the
//! pipeline. Gzip request bodies are decompressed by tower-http.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::{HeaderMap, StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use opentelemetry_proto::tonic::collector::{
    logs::v1::{ExportLogsServiceRequest, ExportLogsServiceResponse},
    metrics::v1::{ExportMetricsServiceRequest, ExportMetricsServiceResponse},
    trace::v1::{ExportTraceServiceRequest, ExportTraceServiceResponse},
};
use prost::Message;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tower_http::decompression::RequestDecompressionLayer;
use tracing::{error, info, warn};

use crate::error::{OtlpPipelineError, OtlpServerError};
use crate::otlp::{HealthState, Pipeline, Signal, TelemetryMessage};

/// Shared state for HTTP handlers
#[derive(Debug, Clone)]
pub struct OtlpHttpState {
    /// Pipeline every decoded request is written to
    pub pipeline: Arc<Pipeline>,
    /// Health reported by `GET /health`
    pub health: Arc<HealthState>,
    /// Cancelled on shutdown to abandon pending lock waits
    pub cancel: CancellationToken,
}

/// Content type for OTLP requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContentType {
    Protobuf,
    Json,
}

impl ContentType {
    fn from_headers(headers: &HeaderMap) -> Result<Self, HttpError> {
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/x-protobuf");

        if content_type.starts_with("application/x-protobuf") {
            Ok(Self::Protobuf)
        } else if content_type.starts_with("application/json") {
            Ok(Self::Json)
        } else {
            Err(HttpError::InvalidContentType(content_type.to_owned()))
        }
    }
}

/// Create the OTLP/HTTP router
pub fn otlp_http_router(state: OtlpHttpState, max_body_size: usize) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/v1/traces", post(handle_traces))
        .route("/v1/logs", post(handle_logs))
        .route("/v1/metrics", post(handle_metrics))
        .layer(RequestDecompressionLayer::new())
        .layer(DefaultBodyLimit::max(max_body_size))
        .with_state(state)
}

/// Serve the router until `cancel` fires
pub async fn serve_http(
    router: Router,
    addr: SocketAddr,
    cancel: CancellationToken,
) -> Result<(), OtlpServerError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| OtlpServerError::BindError(format!("{}: {}", addr, e)))?;

    info!("Starting OTLP/HTTP server on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .map_err(|e| OtlpServerError::ShutdownError(e.to_string()))
}

async fn handle_health(State(state): State<OtlpHttpState>) -> Response {
    if state.health.is_degraded() {
        let detail = state.health.last_error().unwrap_or_default();
        (StatusCode::SERVICE_UNAVAILABLE, format!("degraded: {}", detail)).into_response()
    } else {
        (StatusCode::OK, "ok").into_response()
    }
}

#[tracing::instrument(skip_all, fields(signal = "traces"))]
async fn handle_traces(
    State(state): State<OtlpHttpState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, HttpError> {
    ingest::<ExportTraceServiceRequest, ExportTraceServiceResponse>(
        &state,
        &headers,
        &body,
        Signal::Traces,
    )
    .await
}

#[tracing::instrument(skip_all, fields(signal = "logs"))]
async fn handle_logs(
    State(state): State<OtlpHttpState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, HttpError> {
    ingest::<ExportLogsServiceRequest, ExportLogsServiceResponse>(
        &state,
        &headers,
        &body,
        Signal::Logs,
    )
    .await
}

#[tracing::instrument(skip_all, fields(signal = "metrics"))]
async fn handle_metrics(
    State(state): State<OtlpHttpState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, HttpError> {
    ingest::<ExportMetricsServiceRequest, ExportMetricsServiceResponse>(
        &state,
        &headers,
        &body,
        Signal::Metrics,
    )
    .await
}

async fn ingest<Req, Resp>(
    state: &OtlpHttpState,
    headers: &HeaderMap,
    body: &[u8],
    signal: Signal,
) -> Result<Response, HttpError>
where
    Req: Message + Default + serde::de::DeserializeOwned + Into<TelemetryMessage>,
    Resp: Message + Default + serde::Serialize,
{
    let content_type = ContentType::from_headers(headers)?;
    let message: TelemetryMessage = decode_request::<Req>(content_type, body)?.into();

    let report = state.pipeline.write(&message, signal, &state.cancel).await?;
    if report.all_failed() {
        return Err(HttpError::AllSinksFailed(report.failed));
    }
    if report.interrupted() {
        return Err(HttpError::Interrupted);
    }

    encode_response(content_type, &Resp::default())
}

fn decode_request<T>(content_type: ContentType, body: &[u8]) -> Result<T, HttpError>
where
    T: Message + Default + serde::de::DeserializeOwned,
{
    match content_type {
        ContentType::Protobuf => T::decode(body).map_err(HttpError::ProtoDecode),
        ContentType::Json => serde_json::from_slice(body).map_err(HttpError::JsonDecode),
    }
}

fn encode_response<T>(content_type: ContentType, response: &T) -> Result<Response, HttpError>
where
    T: Message + serde::Serialize,
{
    match content_type {
        ContentType::Protobuf => Ok((
            StatusCode::OK,
            [(CONTENT_TYPE, "application/x-protobuf")],
            response.encode_to_vec(),
        )
            .into_response()),
        ContentType::Json => {
            let body = serde_json::to_vec(response).map_err(HttpError::JsonEncode)?;
            Ok((StatusCode::OK, [(CONTENT_TYPE, "application/json")], body).into_response())
        }
    }
}

/// Request handling failures and their HTTP status
#[derive(Error, Debug)]
enum HttpError {
    #[error("Unsupported content type: {0}")]
    InvalidContentType(String),

    #[error("Invalid protobuf payload: {0}")]
    ProtoDecode(prost::DecodeError),

    #[error("Invalid JSON payload: {0}")]
    JsonDecode(serde_json::Error),

    #[error("Failed to encode response: {0}")]
    JsonEncode(serde_json::Error),

    #[error(transparent)]
    Pipeline(#[from] OtlpPipelineError),

    #[error("All {0} sinks failed to write the request")]
    AllSinksFailed(usize),

    #[error("Shutting down, request was not persisted")]
    Interrupted,
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let status = match &self {
            HttpError::InvalidContentType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            HttpError::ProtoDecode(_) | HttpError::JsonDecode(_) => StatusCode::BAD_REQUEST,
            HttpError::JsonEncode(_) | HttpError::Pipeline(_) | HttpError::AllSinksFailed(_) => {
                error!(error = %self, "Failed to handle OTLP request");
                StatusCode::INTERNAL_SERVER_ERROR
            }
            HttpError::Interrupted => {
                warn!("Rejected OTLP request during shutdown");
                StatusCode::SERVICE_UNAVAILABLE
            }
        };

        (status, self.to_string()).into_response()
    }
}
