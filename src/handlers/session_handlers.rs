//! HTTP handlers for session uploads, listings, downloads and cleanup.
//! Storage concerns are delegated to `SessionStore`; these handlers only
//! translate between HTTP and the store.

use crate::{
    errors::AppError,
    handlers::session_resolver::PresentedSession,
    models::{
        artifact::{Artifact, ArtifactKind, ImageFormat},
        upload::{FailedArtifact, UploadedFile},
    },
    services::session_service::{SessionError, SessionStore},
};
use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use base64::{Engine as _, engine::general_purpose};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use tracing::info;
use uuid::Uuid;

/// Multipart field carrying the image files.
const UPLOAD_FIELD: &str = "images";

/// Optional flags shared by upload and listing.
#[derive(Debug, Default, Deserialize)]
pub struct EmbedQuery {
    /// Inline both files as `data:` URLs in the response.
    #[serde(default)]
    pub embed: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    session_id: String,
    issued: bool,
}

/// One original/compressed pair as the browser sees it.
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ImageSummary {
    filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    original_name: Option<String>,
    original_size: u64,
    compressed_size: u64,
    savings_percent: f64,
    original_url: String,
    compressed_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    original_base64: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    compressed_base64: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    session_id: String,
    batch_id: Uuid,
    images: Vec<ImageSummary>,
    failed: Vec<FailedArtifact>,
    zip_url: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingResponse {
    session_id: String,
    images: Vec<ImageSummary>,
    zip_url: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupResponse {
    message: &'static str,
    deleted_files_count: usize,
    deleted_files: Vec<PathBuf>,
    failures: usize,
}

/// `GET /session` — return the caller's session, issuing one if needed.
pub async fn get_session(presented: PresentedSession) -> Response {
    let session = presented.resolve();
    let mut response = Json(SessionResponse {
        session_id: session.token.clone(),
        issued: session.issued,
    })
    .into_response();
    session.apply_cookie(response.headers_mut());
    response
}

/// `POST /upload` — multipart batch under the field `images`.
///
/// A caller without a session gets a fresh one (and the cookie for it).
pub async fn upload_images(
    State(store): State<SessionStore>,
    presented: PresentedSession,
    Query(opts): Query<EmbedQuery>,
    mut multipart: Multipart,
) -> Result<Response, AppError> {
    let session = presented.resolve();

    let mut files = Vec::new();
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let original_name = field.file_name().unwrap_or("upload").to_string();
        let bytes = field.bytes().await?;
        files.push(UploadedFile::new(original_name, bytes));
    }

    let outcome = store.upload(&session.token, files).await?;
    info!(
        "session {} batch {}: {} compressed, {} failed",
        session.token,
        outcome.batch_id,
        outcome.compressed.len(),
        outcome.failed.len()
    );

    let mut images = Vec::with_capacity(outcome.compressed.len());
    for upload in outcome.compressed {
        let mut summary = summarize(&store, &session.token, upload.artifact, opts.embed).await?;
        summary.original_name = Some(upload.original_name);
        images.push(summary);
    }

    let mut response = Json(UploadResponse {
        zip_url: zip_url(&session.token),
        session_id: session.token.clone(),
        batch_id: outcome.batch_id,
        images,
        failed: outcome.failed,
    })
    .into_response();
    session.apply_cookie(response.headers_mut());
    Ok(response)
}

/// `GET /images` — summaries of everything compressed in a session.
pub async fn list_images(
    State(store): State<SessionStore>,
    presented: PresentedSession,
    Query(opts): Query<EmbedQuery>,
) -> Result<Json<ListingResponse>, AppError> {
    let token = require_session(presented)?;
    let artifacts = store.list(&token).await?;

    let mut images = Vec::with_capacity(artifacts.len());
    for artifact in artifacts {
        images.push(summarize(&store, &token, artifact, opts.embed).await?);
    }

    Ok(Json(ListingResponse {
        zip_url: zip_url(&token),
        session_id: token,
        images,
    }))
}

/// `GET /download` — rebuild and stream the session zip.
pub async fn download_archive(
    State(store): State<SessionStore>,
    presented: PresentedSession,
) -> Result<Response, AppError> {
    let token = require_session(presented)?;
    let archive = store.build_archive(&token).await?;
    let file = File::open(&archive)
        .await
        .map_err(|err| AppError::from(SessionError::Io(err)))?;
    let len = file
        .metadata()
        .await
        .map_err(|err| AppError::from(SessionError::Io(err)))?
        .len();

    let mut response = Response::new(Body::from_stream(ReaderStream::new(file)));
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/zip"),
    );
    set_length(headers, len);
    if let Ok(value) = HeaderValue::from_str(&format!(
        "attachment; filename=\"{}-compressed.zip\"",
        token
    )) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    Ok(response)
}

/// `GET /files/{kind}/{filename}` — stream one original or compressed file.
pub async fn get_artifact(
    State(store): State<SessionStore>,
    presented: PresentedSession,
    Path((kind, filename)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let token = require_session(presented)?;
    let kind = kind.parse::<ArtifactKind>().map_err(AppError::not_found)?;
    let (file, len) = store.open_artifact(&token, kind, &filename).await?;

    let content_type = ImageFormat::from_path(std::path::Path::new(&filename))
        .map(ImageFormat::mime_type)
        .unwrap_or("application/octet-stream");

    let mut response = Response::new(Body::from_stream(ReaderStream::new(file)));
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    set_length(headers, len);
    Ok(response)
}

/// `GET /cron/cleanup` — run the janitor once.
pub async fn run_cleanup(State(store): State<SessionStore>) -> impl IntoResponse {
    let report = store.sweep_expired().await;
    Json(CleanupResponse {
        message: "Old files cleaned up",
        deleted_files_count: report.deleted_count(),
        deleted_files: report.deleted_files,
        failures: report.failures,
    })
}

fn require_session(presented: PresentedSession) -> Result<String, AppError> {
    presented
        .0
        .ok_or_else(|| AppError::from(SessionError::MissingSession))
}

fn zip_url(token: &str) -> String {
    format!("/download?sessionId={}", token)
}

fn artifact_url(token: &str, kind: ArtifactKind, filename: &str) -> String {
    format!("/files/{}/{}?sessionId={}", kind, filename, token)
}

async fn summarize(
    store: &SessionStore,
    token: &str,
    artifact: Artifact,
    embed: bool,
) -> Result<ImageSummary, AppError> {
    let (original_base64, compressed_base64) = if embed {
        (
            data_url(store, token, ArtifactKind::Original, &artifact.filename).await?,
            data_url(store, token, ArtifactKind::Compressed, &artifact.filename).await?,
        )
    } else {
        (None, None)
    };

    Ok(ImageSummary {
        savings_percent: artifact.savings_percent(),
        original_url: artifact_url(token, ArtifactKind::Original, &artifact.filename),
        compressed_url: artifact_url(token, ArtifactKind::Compressed, &artifact.filename),
        original_name: None,
        original_size: artifact.original_size,
        compressed_size: artifact.compressed_size,
        filename: artifact.filename,
        original_base64,
        compressed_base64,
    })
}

async fn data_url(
    store: &SessionStore,
    token: &str,
    kind: ArtifactKind,
    filename: &str,
) -> Result<Option<String>, AppError> {
    let Some(bytes) = store.read_artifact(token, kind, filename).await? else {
        return Ok(None);
    };
    let mime = ImageFormat::from_path(std::path::Path::new(filename))
        .map(ImageFormat::mime_type)
        .unwrap_or("application/octet-stream");
    Ok(Some(format!(
        "data:{};base64,{}",
        mime,
        general_purpose::STANDARD.encode(bytes)
    )))
}

fn set_length(headers: &mut HeaderMap, len: u64) {
    headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from_str(&len.to_string()).unwrap_or_else(|_| HeaderValue::from_static("0")),
    );
}
