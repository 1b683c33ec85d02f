//! src/services/session_service.rs
//!
//! SessionStore — the session-scoped file lifecycle. Each session token maps
//! to `base_path/{token}/` holding `input/` (originals), `output/`
//! (compressed results) and, once downloaded, `compressed.zip`. Nothing is
//! kept in memory; every call reads the current directory state.

use chrono::Utc;
use futures::future::try_join_all;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, SystemTime},
};
use thiserror::Error;
use tokio::fs::{self, File};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::{
    artifact::{Artifact, ArtifactKind},
    cleanup::CleanupReport,
    upload::{CompressedUpload, FailedArtifact, UploadOutcome, UploadedFile},
};

use super::{archive_service, compression_service::Compressor, janitor_service};

/// Name of the per-session zip, next to `input/` and `output/`.
pub const ARCHIVE_FILE_NAME: &str = "compressed.zip";

const MAX_SESSION_TOKEN_LEN: usize = 128;
const MAX_EXTENSION_LEN: usize = 10;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("missing session identifier")]
    MissingSession,
    #[error("invalid session identifier `{0}`")]
    InvalidSession(String),
    #[error("invalid artifact filename `{0}`")]
    InvalidFilename(String),
    #[error("no files uploaded")]
    NoFilesProvided,
    #[error("compression failed for all {failed} uploaded files")]
    CompressionFailed { failed: usize },
    #[error("no compressed images for session `{0}`")]
    NoSessionData(String),
    #[error("no compressed files found for session `{0}`")]
    NoCompressedContent(String),
    #[error("artifact `{0}` not found")]
    ArtifactNotFound(String),
    #[error("error building archive: {0}")]
    Archive(#[from] zip::result::ZipError),
    #[error("could not store upload `{path}`: {source}")]
    UploadWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type SessionResult<T> = Result<T, SessionError>;

/// Outcome of compressing one stored upload.
enum FileOutcome {
    Compressed(CompressedUpload),
    Failed(FailedArtifact),
}

/// SessionStore is the capability every handler receives as state:
/// - Upload a batch (store originals, compress each file independently)
/// - List a session's original/compressed pairs
/// - Build the session archive
/// - Sweep expired files across all sessions
///
/// Swapping the storage root or the compressor never touches handler code.
#[derive(Clone)]
pub struct SessionStore {
    /// Directory holding one folder per session.
    pub base_path: PathBuf,

    /// Files older than this are removed by the janitor.
    pub retention: Duration,

    compressor: Arc<dyn Compressor>,
}

impl SessionStore {
    pub fn new(
        base_path: impl Into<PathBuf>,
        retention: Duration,
        compressor: Arc<dyn Compressor>,
    ) -> Self {
        Self {
            base_path: base_path.into(),
            retention,
            compressor,
        }
    }

    /// Return the presented token, or issue a fresh one.
    ///
    /// The boolean is `true` when the token was newly issued. Directories
    /// are not created here; a session without them simply has no data yet.
    pub fn resolve_token(presented: Option<&str>) -> (String, bool) {
        match presented.map(str::trim).filter(|t| !t.is_empty()) {
            Some(token) => (token.to_string(), false),
            None => (Uuid::new_v4().to_string(), true),
        }
    }

    /// Session tokens become path components, so only `[A-Za-z0-9_-]` is
    /// accepted.
    fn ensure_token_safe(token: &str) -> SessionResult<()> {
        if token.is_empty() {
            return Err(SessionError::MissingSession);
        }
        if token.len() > MAX_SESSION_TOKEN_LEN
            || !token
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        {
            return Err(SessionError::InvalidSession(token.to_string()));
        }
        Ok(())
    }

    /// Reject artifact names that could escape the session directory.
    fn ensure_filename_safe(name: &str) -> SessionResult<()> {
        if name.is_empty()
            || name.contains("..")
            || name
                .bytes()
                .any(|b| b == b'/' || b == b'\\' || b.is_ascii_control())
        {
            return Err(SessionError::InvalidFilename(name.to_string()));
        }
        Ok(())
    }

    fn session_root(&self, token: &str) -> PathBuf {
        self.base_path.join(token)
    }

    fn kind_dir(&self, token: &str, kind: ArtifactKind) -> PathBuf {
        self.session_root(token).join(kind.dir_name())
    }

    pub fn archive_path(&self, token: &str) -> PathBuf {
        self.session_root(token).join(ARCHIVE_FILE_NAME)
    }

    /// Create `input/` and `output/` for a session; existing ones are fine.
    async fn ensure_session_dirs(&self, token: &str) -> SessionResult<()> {
        for kind in [ArtifactKind::Original, ArtifactKind::Compressed] {
            let dir = self.kind_dir(token, kind);
            fs::create_dir_all(&dir)
                .await
                .map_err(|source| SessionError::UploadWrite { path: dir, source })?;
        }
        Ok(())
    }

    /// Store and compress a batch of uploads.
    ///
    /// Every file gets a fresh stored name and is compressed on its own.
    /// Files whose compression fails are reported in `failed`; the call only
    /// errors with `CompressionFailed` when no file of the batch succeeded.
    /// Failing to write an original aborts the batch with `UploadWrite`.
    pub async fn upload(
        &self,
        token: &str,
        files: Vec<UploadedFile>,
    ) -> SessionResult<UploadOutcome> {
        Self::ensure_token_safe(token)?;
        if files.is_empty() {
            return Err(SessionError::NoFilesProvided);
        }
        self.ensure_session_dirs(token).await?;

        let batch_id = Uuid::new_v4();
        let total = files.len();
        info!(
            "session {} batch {}: storing {} files",
            token, batch_id, total
        );

        let timestamp = Utc::now().timestamp_millis();
        let outcomes = try_join_all(
            files
                .into_iter()
                .map(|file| self.store_and_compress(token, timestamp, file)),
        )
        .await?;

        let mut compressed = Vec::new();
        let mut failed = Vec::new();
        for outcome in outcomes {
            match outcome {
                FileOutcome::Compressed(c) => compressed.push(c),
                FileOutcome::Failed(f) => failed.push(f),
            }
        }

        if compressed.is_empty() {
            return Err(SessionError::CompressionFailed { failed: total });
        }
        if !failed.is_empty() {
            warn!(
                "session {} batch {}: {} of {} files failed to compress",
                token,
                batch_id,
                failed.len(),
                total
            );
        }

        Ok(UploadOutcome {
            batch_id,
            compressed,
            failed,
        })
    }

    async fn store_and_compress(
        &self,
        token: &str,
        timestamp: i64,
        file: UploadedFile,
    ) -> SessionResult<FileOutcome> {
        let filename = unique_name(timestamp, &file.original_name);
        let input = self.kind_dir(token, ArtifactKind::Original).join(&filename);
        let output = self.kind_dir(token, ArtifactKind::Compressed).join(&filename);

        fs::write(&input, &file.bytes)
            .await
            .map_err(|source| SessionError::UploadWrite {
                path: input.clone(),
                source,
            })?;
        debug!(
            "stored {} ({} bytes) as {}",
            file.original_name,
            file.bytes.len(),
            input.display()
        );

        let error = match self.compressor.compress(&input, &output).await {
            Ok(()) => match fs::metadata(&output).await {
                Ok(meta) if meta.is_file() => {
                    return Ok(FileOutcome::Compressed(CompressedUpload {
                        original_name: file.original_name,
                        artifact: Artifact {
                            filename,
                            original_size: file.bytes.len() as u64,
                            compressed_size: meta.len(),
                        },
                    }));
                }
                Ok(_) => "engine output is not a regular file".to_string(),
                Err(err) => format!("engine produced no output: {}", err),
            },
            Err(err) => err.to_string(),
        };

        warn!("compression of {} failed: {}", filename, error);
        // never leave a half-written output where the listing can see it
        match fs::remove_file(&output).await {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!("could not remove partial output {}: {}", output.display(), e),
        }
        Ok(FileOutcome::Failed(FailedArtifact {
            filename,
            original_name: file.original_name,
            error,
        }))
    }

    /// Enumerate the session's compressed files in directory order, pairing
    /// each with the same-named original.
    ///
    /// A missing original reports size 0. A missing `output/` is
    /// `NoSessionData`.
    pub async fn list(&self, token: &str) -> SessionResult<Vec<Artifact>> {
        Self::ensure_token_safe(token)?;
        let output_dir = self.kind_dir(token, ArtifactKind::Compressed);
        let input_dir = self.kind_dir(token, ArtifactKind::Original);

        let mut entries = match fs::read_dir(&output_dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(SessionError::NoSessionData(token.to_string()));
            }
            Err(err) => return Err(SessionError::Io(err)),
        };

        let mut artifacts = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let meta = match entry.metadata().await {
                Ok(meta) if meta.is_file() => meta,
                Ok(_) => continue,
                // swept between read_dir and stat
                Err(err) if err.kind() == ErrorKind::NotFound => continue,
                Err(err) => return Err(SessionError::Io(err)),
            };
            let filename = entry.file_name().to_string_lossy().into_owned();
            let original_size = match fs::metadata(input_dir.join(&filename)).await {
                Ok(original) if original.is_file() => original.len(),
                _ => 0,
            };
            artifacts.push(Artifact {
                filename,
                original_size,
                compressed_size: meta.len(),
            });
        }

        debug!("session {} lists {} artifacts", token, artifacts.len());
        Ok(artifacts)
    }

    /// Rebuild the session archive from the current `output/` contents.
    pub async fn build_archive(&self, token: &str) -> SessionResult<PathBuf> {
        Self::ensure_token_safe(token)?;
        archive_service::build_archive(
            token,
            &self.kind_dir(token, ArtifactKind::Compressed),
            &self.archive_path(token),
        )
        .await
    }

    /// Open one stored artifact for streaming, returning its size too.
    pub async fn open_artifact(
        &self,
        token: &str,
        kind: ArtifactKind,
        filename: &str,
    ) -> SessionResult<(File, u64)> {
        Self::ensure_token_safe(token)?;
        Self::ensure_filename_safe(filename)?;
        let path = self.kind_dir(token, kind).join(filename);
        let file = File::open(&path).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                SessionError::ArtifactNotFound(format!("{}/{}", kind, filename))
            } else {
                SessionError::Io(err)
            }
        })?;
        let len = file.metadata().await?.len();
        Ok((file, len))
    }

    /// Read one stored artifact into memory; a missing file reads as `None`.
    pub async fn read_artifact(
        &self,
        token: &str,
        kind: ArtifactKind,
        filename: &str,
    ) -> SessionResult<Option<Vec<u8>>> {
        Self::ensure_token_safe(token)?;
        Self::ensure_filename_safe(filename)?;
        match fs::read(self.kind_dir(token, kind).join(filename)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(SessionError::Io(err)),
        }
    }

    /// Run the janitor over every session with the configured retention.
    pub async fn sweep_expired(&self) -> CleanupReport {
        janitor_service::sweep(&self.base_path, self.retention, SystemTime::now()).await
    }
}

/// Build a stored filename: `{timestamp_ms}-{random}{.ext}`.
///
/// The random part alone keeps names unique, so identical timestamps from
/// concurrent uploads cannot collide. Only a short alphanumeric extension is
/// carried over from the client's filename.
pub fn unique_name(timestamp_ms: i64, original_name: &str) -> String {
    let ext = Path::new(original_name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| {
            !e.is_empty()
                && e.len() <= MAX_EXTENSION_LEN
                && e.bytes().all(|b| b.is_ascii_alphanumeric())
        })
        .map(|e| format!(".{}", e))
        .unwrap_or_default();
    format!("{}-{}{}", timestamp_ms, Uuid::new_v4().simple(), ext)
}
