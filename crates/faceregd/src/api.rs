//! HTTP surface of the daemon.

use crate::engine::{EngineError, EngineHandle, Upload};
use axum::body::Bytes;
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::rejection::{BytesRejection, JsonRejection};
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use base64::Engine as _;
use facereg_core::{FaceRegistry, MatchResult, MultiFacePolicy, RegistryError};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Room left in the body limit for multipart boundaries and the name field.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

const NAME_MIN_CHARS: usize = 2;
const NAME_MAX_CHARS: usize = 50;

#[derive(Debug, Clone, Copy)]
pub struct UploadLimits {
    pub max_bytes: usize,
    pub min_bytes: usize,
}

#[derive(Clone)]
pub struct AppState {
    pub engine: EngineHandle,
    pub registry: Arc<FaceRegistry>,
    pub limits: UploadLimits,
    pub policy: MultiFacePolicy,
}

pub fn router(state: AppState) -> Router {
    let body_limit = state.limits.max_bytes.saturating_add(MULTIPART_OVERHEAD);
    Router::new()
        .route("/recognize-frame", post(handler_recognize_frame))
        .route("/upload-face", post(handler_upload_face))
        .route("/faces", get(handler_list_faces))
        .route("/face", delete(handler_delete_face))
        .route("/status", get(handler_status))
        .route("/rebuild", post(handler_rebuild))
        .fallback(handler_not_found)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("not found")]
    NotFound,
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Multipart(#[from] MultipartError),
    #[error(transparent)]
    MultipartRejected(#[from] MultipartRejection),
    #[error(transparent)]
    BodyRejected(#[from] BytesRejection),
}

impl ApiError {
    fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, message.clone()),
            Self::NotFound => (StatusCode::NOT_FOUND, "not found".to_string()),
            Self::Multipart(err) => rejection(err.status(), err.body_text()),
            Self::MultipartRejected(err) => rejection(err.status(), err.body_text()),
            Self::BodyRejected(err) => rejection(err.status(), err.body_text()),
            Self::Engine(EngineError::Registry(RegistryError::NotFound(_))) => {
                (StatusCode::NOT_FOUND, "not found".to_string())
            }
            Self::Engine(err) => (engine_status(err), err.to_string()),
        }
    }
}

/// Keep the extractor's status; oversized bodies get a stable message.
fn rejection(status: StatusCode, text: String) -> (StatusCode, String) {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        (status, "file too large".to_string())
    } else {
        (status, text)
    }
}

fn engine_status(err: &EngineError) -> StatusCode {
    match err {
        EngineError::Decode(_) => StatusCode::BAD_REQUEST,
        EngineError::Registry(err) => match err {
            RegistryError::Decode(_)
            | RegistryError::NoFaceDetected
            | RegistryError::MultipleFacesDetected(_)
            | RegistryError::InvalidName
            | RegistryError::InvalidFileType(_)
            | RegistryError::InvalidFilename(_) => StatusCode::BAD_REQUEST,
            RegistryError::DuplicateName(_) => StatusCode::CONFLICT,
            RegistryError::NotFound(_) => StatusCode::NOT_FOUND,
            RegistryError::Storage(_) | RegistryError::Provider(_) => StatusCode::INTERNAL_SERVER_ERROR,
        },
        EngineError::Provider(_) | EngineError::Spawn(_) => StatusCode::INTERNAL_SERVER_ERROR,
        EngineError::ChannelClosed => StatusCode::SERVICE_UNAVAILABLE,
        EngineError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let request_id = uuid::Uuid::new_v4().to_string();
        let (status, message) = self.status_and_message();

        if status.is_server_error() {
            tracing::error!(request_id = %request_id, status = status.as_u16(), error = ?self, "request failed");
        } else {
            tracing::warn!(request_id = %request_id, status = status.as_u16(), error = %message, "request rejected");
        }

        let mut response = (status, Json(json!({ "error": message }))).into_response();
        if let Ok(value) = HeaderValue::from_str(&request_id) {
            response.headers_mut().insert("x-request-id", value);
        }
        response
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Deserialize)]
struct RecognizeRequest {
    image: Option<String>,
}

async fn handler_recognize_frame(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> ApiResult<Json<Vec<MatchResult>>> {
    let body = body?;
    let image = if is_json(&headers) {
        let request: RecognizeRequest = serde_json::from_slice(&body)
            .map_err(|err| ApiError::BadRequest(format!("invalid JSON body: {err}")))?;
        let encoded = request
            .image
            .ok_or_else(|| ApiError::BadRequest("no image data provided".to_string()))?;
        decode_image_field(&encoded)?
    } else {
        body.to_vec()
    };

    if image.is_empty() {
        return Err(ApiError::BadRequest("no image data provided".to_string()));
    }

    let results = state.engine.recognize(image).await?;
    Ok(Json(results))
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim_start().to_ascii_lowercase().starts_with("application/json"))
        .unwrap_or(false)
}

/// Base64 payload, optionally wrapped in a `data:image/...;base64,` URL.
fn decode_image_field(encoded: &str) -> ApiResult<Vec<u8>> {
    let payload = match encoded.strip_prefix("data:") {
        Some(rest) => rest.split_once(',').map(|(_, data)| data).unwrap_or(""),
        None => encoded,
    };
    base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|err| ApiError::BadRequest(format!("invalid base64 image data: {err}")))
}

async fn handler_upload_face(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<Value>> {
    let mut multipart = multipart?;
    let mut file: Option<(String, Bytes)> = None;
    let mut name: Option<String> = None;

    while let Some(field) = multipart.next_field().await? {
        let field_name = field.name().map(str::to_owned);
        match field_name.as_deref() {
            Some("file") => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await?;
                file = Some((filename, bytes));
            }
            Some("name") => name = Some(field.text().await?),
            _ => {}
        }
    }

    let (original_filename, bytes) = file.ok_or_else(|| ApiError::BadRequest("no file provided".to_string()))?;
    let name = name.ok_or_else(|| ApiError::BadRequest("no name provided".to_string()))?;
    let name = name.trim().to_string();
    check_upload(&name, &original_filename, bytes.len(), state.limits)?;

    let filename = state
        .engine
        .register(Upload {
            name: name.clone(),
            original_filename,
            bytes: bytes.to_vec(),
        })
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": format!("face for \"{name}\" added"),
        "filename": filename,
    })))
}

/// Request-level checks that run before the engine sees the upload.
fn check_upload(name: &str, original_filename: &str, size: usize, limits: UploadLimits) -> ApiResult<()> {
    let bad = |message: String| Err(ApiError::BadRequest(message));

    if name.is_empty() {
        return bad("name cannot be empty".to_string());
    }
    let chars = name.chars().count();
    if chars < NAME_MIN_CHARS {
        return bad(format!("name must be at least {NAME_MIN_CHARS} characters long"));
    }
    if chars > NAME_MAX_CHARS {
        return bad(format!("name must be at most {NAME_MAX_CHARS} characters long"));
    }
    if original_filename.is_empty() {
        return bad("no file selected".to_string());
    }
    if facereg_core::registry::allowed_extension(original_filename).is_none() {
        return bad(format!(
            "invalid file type; allowed: {}",
            facereg_core::ALLOWED_EXTENSIONS.join(", ")
        ));
    }
    if size > limits.max_bytes {
        return bad(format!("file too large; maximum size is {} bytes", limits.max_bytes));
    }
    if size < limits.min_bytes {
        return bad(format!("file too small; minimum size is {} bytes", limits.min_bytes));
    }
    Ok(())
}

async fn handler_list_faces(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let faces = state
        .registry
        .list_known_files()
        .map_err(|err| ApiError::Engine(err.into()))?;
    Ok(Json(json!({
        "success": true,
        "count": faces.len(),
        "faces": faces,
    })))
}

#[derive(Deserialize)]
struct DeleteRequest {
    filename: Option<String>,
}

async fn handler_delete_face(
    State(state): State<AppState>,
    payload: Result<Json<DeleteRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let filename = payload
        .ok()
        .and_then(|Json(req)| req.filename)
        .filter(|f| !f.is_empty())
        .ok_or_else(|| ApiError::BadRequest("no filename provided".to_string()))?;

    state.engine.delete(filename.clone()).await?;
    Ok(Json(json!({
        "success": true,
        "message": format!("{filename} deleted"),
    })))
}

async fn handler_status(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "known_faces": state.registry.len(),
        "faces_dir": state.registry.dir().display().to_string(),
        "tolerance": state.registry.tolerance(),
        "on_multiple_faces": state.policy,
    }))
}

async fn handler_rebuild(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let count = state.engine.rebuild().await?;
    Ok(Json(json!({ "success": true, "count": count })))
}

async fn handler_not_found() -> ApiError {
    ApiError::NotFound
}
