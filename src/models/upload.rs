//! Represents one upload batch and its per-file outcome.

use bytes::Bytes;
use serde::Serialize;
use uuid::Uuid;

use super::artifact::Artifact;

/// A file received from the client, before it touches disk.
#[derive(Clone, Debug)]
pub struct UploadedFile {
    /// Filename as the client named it. Only used for reporting.
    pub original_name: String,

    pub bytes: Bytes,
}

impl UploadedFile {
    pub fn new(original_name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            original_name: original_name.into(),
            bytes: bytes.into(),
        }
    }
}

/// A stored artifact together with the client filename it came from.
#[derive(Clone, Debug)]
pub struct CompressedUpload {
    pub original_name: String,
    pub artifact: Artifact,
}

/// A file whose original was stored but whose compression failed.
#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct FailedArtifact {
    pub filename: String,
    pub original_name: String,
    pub error: String,
}

/// Result of one upload batch: every file lands in exactly one list.
#[derive(Clone, Debug)]
pub struct UploadOutcome {
    /// Identifier grouping the files of this request.
    pub batch_id: Uuid,
    pub compressed: Vec<CompressedUpload>,
    pub failed: Vec<FailedArtifact>,
}
