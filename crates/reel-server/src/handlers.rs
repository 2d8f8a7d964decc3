//! HTTP request handlers for the artifact server.
//!
//! Implements upload processing, streamed preview/download, deletion and
//! maintenance endpoints using axum.

use crate::render::{RenderError, RenderParams};
use crate::service::{ArtifactService, ServiceError, ServiceStatus};
use axum::{
    body::Body,
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
    Router as AxumRouter,
};
use reel_domain::ArtifactRecord;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use futures::{Stream, StreamExt};
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Artifact lifecycle operations
    pub service: Arc<ArtifactService>,
    /// Largest accepted request body for `/process`
    pub max_upload_bytes: usize,
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthCheckResponse {
    /// Overall health status
    pub status: String,
    /// Number of tracked artifacts
    pub active_artifacts: usize,
}

/// Successful `/process` response
#[derive(Debug, Serialize, Deserialize)]
pub struct ProcessResponse {
    /// Artifact identifier
    pub id: String,
    /// Inline playback URL
    pub preview_url: String,
    /// Attachment download URL
    pub download_url: String,
    /// Size of the rendered file
    pub size_bytes: u64,
}

impl From<&ArtifactRecord> for ProcessResponse {
    fn from(record: &ArtifactRecord) -> Self {
        Self {
            id: record.id.to_string(),
            preview_url: format!("/preview/{}", record.id),
            download_url: format!("/download/{}", record.id),
            size_bytes: record.size_bytes,
        }
    }
}

/// `/sweep` response
#[derive(Debug, Serialize, Deserialize)]
pub struct SweepResponse {
    /// Artifacts evicted by this sweep
    pub evicted: usize,
}

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error message
    pub error: String,
}

/// Application error type
#[derive(Debug)]
pub enum AppError {
    /// Service-level failure
    Service(ServiceError),
    /// Malformed multipart body
    BadUpload(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Service(ServiceError::NotFound(_)) => {
                (StatusCode::NOT_FOUND, "File not found or expired".to_string())
            }
            AppError::Service(e @ ServiceError::InvalidRequest(_))
            | AppError::Service(e @ ServiceError::Render(RenderError::InvalidParams(_))) => {
                (StatusCode::BAD_REQUEST, e.to_string())
            }
            AppError::Service(e) => {
                tracing::error!(error = %e, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
            AppError::BadUpload(msg) => (StatusCode::BAD_REQUEST, msg),
        };

        let body = Json(ErrorResponse { error: message });
        (status, body).into_response()
    }
}

impl From<ServiceError> for AppError {
    fn from(e: ServiceError) -> Self {
        AppError::Service(e)
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::Service(ServiceError::Io(e))
    }
}

/// Media type for a rendered file, by extension
pub fn content_type_for(filename: &str) -> &'static str {
    let ext = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "mp4" | "m4v" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        _ => "application/octet-stream",
    }
}

/// GET / - Liveness message
async fn index() -> &'static str {
    "Reel artifact server is running"
}

/// GET /health - Health check
async fn health_check(State(state): State<AppState>) -> Result<Json<HealthCheckResponse>, AppError> {
    let status = state.service.status()?;
    Ok(Json(HealthCheckResponse {
        status: "healthy".to_string(),
        active_artifacts: status.active_artifacts,
    }))
}

/// GET /status - Operational snapshot
async fn status(State(state): State<AppState>) -> Result<Json<ServiceStatus>, AppError> {
    Ok(Json(state.service.status()?))
}

/// POST /sweep - Evict expired artifacts now
async fn sweep(State(state): State<AppState>) -> Result<Json<SweepResponse>, AppError> {
    let evicted = state.service.sweep_now().await?;
    Ok(Json(SweepResponse { evicted }))
}

/// Remove a partially written upload; the caller is already failing
async fn discard_upload(path: Option<&std::path::Path>) {
    if let Some(path) = path {
        if let Err(e) = tokio::fs::remove_file(path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %path.display(), error = %e, "Failed to remove upload");
            }
        }
    }
}

/// Copy every chunk into `sink` and flush it
async fn write_upload<S, B, E, W>(chunks: S, sink: &mut W) -> Result<u64, AppError>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
    W: AsyncWrite + Unpin,
{
    let mut chunks = std::pin::pin!(chunks);
    let mut written = 0u64;

    while let Some(chunk) = chunks.next().await {
        let chunk = chunk.map_err(|e| AppError::BadUpload(e.to_string()))?;
        sink.write_all(chunk.as_ref()).await?;
        written += chunk.as_ref().len() as u64;
    }
    sink.flush().await?;

    Ok(written)
}

/// Persist an upload at `path` through `sink`; the file is removed on any failure
async fn save_upload<S, B, E, W>(path: &std::path::Path, chunks: S, mut sink: W) -> Result<u64, AppError>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
    W: AsyncWrite + Unpin,
{
    let result = write_upload(chunks, &mut sink).await;
    drop(sink);

    if result.is_err() {
        discard_upload(Some(path)).await;
    }
    result
}

/// POST /process - Upload, render and register an artifact
///
/// Expects a multipart body with a `file` part and an optional `params`
/// part holding a JSON [`RenderParams`] bundle.
async fn process(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ProcessResponse>, AppError> {
    let mut upload: Option<(std::path::PathBuf, String)> = None;
    let mut params_json: Option<String> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                discard_upload(upload.as_ref().map(|(p, _)| p.as_path())).await;
                return Err(AppError::BadUpload(e.to_string()));
            }
        };

        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") if upload.is_none() => {
                let original = field.file_name().unwrap_or("upload.mp4").to_string();
                let path = state.service.upload_path(&original);
                let file = tokio::fs::File::create(&path).await?;
                let written = save_upload(&path, field, file).await?;

                tracing::debug!(path = %path.display(), written, "Upload stored");
                upload = Some((path, original));
            }
            Some("params") => match field.text().await {
                Ok(text) => params_json = Some(text),
                Err(e) => {
                    discard_upload(upload.as_ref().map(|(p, _)| p.as_path())).await;
                    return Err(AppError::BadUpload(e.to_string()));
                }
            },
            _ => {}
        }
    }

    let Some((input, original)) = upload else {
        return Err(AppError::BadUpload("missing `file` part".to_string()));
    };

    let params = match params_json.as_deref().map(str::trim) {
        None | Some("") => RenderParams::default(),
        Some(text) => match serde_json::from_str::<RenderParams>(text) {
            Ok(params) => params,
            Err(e) => {
                discard_upload(Some(&input)).await;
                return Err(AppError::BadUpload(format!("invalid params: {e}")));
            }
        },
    };

    let record = state.service.process_upload(input, &original, params).await?;
    Ok(Json(ProcessResponse::from(&record)))
}

/// Build a streamed response over an artifact's file
async fn stream_artifact(state: &AppState, raw_id: &str, attachment: bool) -> Result<Response, AppError> {
    let id = ArtifactService::parse_id(raw_id)?;
    let (record, stream) = state.service.open_artifact(id).await?;

    let mut response = Body::from_stream(stream).into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(content_type_for(&record.display_filename)),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(record.size_bytes));
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));

    if attachment {
        let disposition = format!("attachment; filename=\"{}\"", record.display_filename);
        if let Ok(value) = HeaderValue::from_str(&disposition) {
            headers.insert(header::CONTENT_DISPOSITION, value);
        }
    } else {
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    }

    tracing::debug!(artifact_id = %id, attachment, size_bytes = record.size_bytes, "Streaming artifact");
    Ok(response)
}

/// GET /preview/:id - Inline playback
async fn preview(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response, AppError> {
    stream_artifact(&state, &id, false).await
}

/// GET /download/:id - Attachment download
async fn download(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response, AppError> {
    stream_artifact(&state, &id, true).await
}

/// DELETE /artifacts/:id - Idempotent removal
async fn delete_artifact(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    // Malformed ids can never be tracked, so deleting them is a no-op
    if let Ok(id) = ArtifactService::parse_id(&id) {
        state.service.delete_artifact(id).await?;
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Create the axum router with all routes
pub fn create_router(state: AppState) -> AxumRouter {
    let upload_limit = DefaultBodyLimit::max(state.max_upload_bytes);

    AxumRouter::new()
        .route("/", get(index))
        .route("/health", get(health_check))
        .route("/status", get(status))
        .route("/sweep", post(sweep))
        .route("/process", post(process).layer(upload_limit))
        .route("/preview/:id", get(preview))
        .route("/download/:id", get(download))
        .route("/artifacts/:id", delete(delete_artifact))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::CommandRenderer;
    use axum::http::Request;
    use reel_janitor::{Reaper, ReaperConfig};
    use reel_store::MemoryStore;
    use tower::ServiceExt; // for oneshot

    fn create_test_state(dir: &std::path::Path) -> AppState {
        let reaper = Reaper::new(ReaperConfig {
            background_deletion: false,
            ..Default::default()
        });
        let service = ArtifactService::new(
            Arc::new(MemoryStore::new()),
            Arc::new(reaper),
            Arc::new(CommandRenderer::new("cp", vec!["{input}".into(), "{output}".into()])),
            dir,
            1024,
        );
        AppState {
            service: Arc::new(service),
            max_upload_bytes: 1024 * 1024,
        }
    }

    /// Accepts writes, fails every flush
    struct FlushFails;

    impl AsyncWrite for FlushFails {
        fn poll_write(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
            buf: &[u8],
        ) -> std::task::Poll<std::io::Result<usize>> {
            std::task::Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::task::Poll::Ready(Err(std::io::Error::other("disk full")))
        }

        fn poll_shutdown(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::task::Poll::Ready(Ok(()))
        }
    }

    fn chunks(parts: Vec<Result<&'static [u8], &'static str>>) -> impl Stream<Item = Result<&'static [u8], &'static str>> {
        futures::stream::iter(parts)
    }

    #[tokio::test]
    async fn test_save_upload_writes_all_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("abc_clip.mp4");
        let file = tokio::fs::File::create(&path).await.unwrap();

        let written = save_upload(&path, chunks(vec![Ok(&b"fra"[..]), Ok(&b"mes"[..])]), file)
            .await
            .unwrap();

        assert_eq!(written, 6);
        assert_eq!(std::fs::read(&path).unwrap(), b"frames");
    }

    #[tokio::test]
    async fn test_save_upload_discards_on_failed_flush() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("abc_clip.mp4");
        std::fs::write(&path, b"partial").unwrap();

        let err = save_upload(&path, chunks(vec![Ok(&b"frames"[..])]), FlushFails)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Service(ServiceError::Io(_))));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_save_upload_discards_on_broken_body() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("abc_clip.mp4");
        let file = tokio::fs::File::create(&path).await.unwrap();

        let err = save_upload(&path, chunks(vec![Ok(&b"fra"[..]), Err("connection reset")]), file)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::BadUpload(msg) if msg == "connection reset"));
        assert!(!path.exists());
    }

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for("processed.mp4"), "video/mp4");
        assert_eq!(content_type_for("clip.MOV"), "video/quicktime");
        assert_eq!(content_type_for("noext"), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_index() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_router(create_test_state(dir.path()));

        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health_check() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_router(create_test_state(dir.path()));

        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_malformed_id_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_router(create_test_state(dir.path()));

        let request = Request::builder()
            .uri("/preview/not-a-uuid")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_process_without_file_part() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_router(create_test_state(dir.path()));

        let body = "--XBOUNDARY\r\n\
            Content-Disposition: form-data; name=\"params\"\r\n\r\n\
            {}\r\n\
            --XBOUNDARY--\r\n";
        let request = Request::builder()
            .method("POST")
            .uri("/process")
            .header("content-type", "multipart/form-data; boundary=XBOUNDARY")
            .body(Body::from(body))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
