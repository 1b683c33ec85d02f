//! Represents an image artifact held in a session directory.

use std::{fmt, path::Path, str::FromStr};

/// Which side of a session an artifact lives on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArtifactKind {
    /// The bytes as uploaded, stored under `input/`.
    Original,
    /// The compressed result, stored under `output/`.
    Compressed,
}

impl ArtifactKind {
    /// Subdirectory of the session folder holding this kind.
    pub fn dir_name(self) -> &'static str {
        match self {
            ArtifactKind::Original => "input",
            ArtifactKind::Compressed => "output",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactKind::Original => f.write_str("original"),
            ArtifactKind::Compressed => f.write_str("compressed"),
        }
    }
}

impl FromStr for ArtifactKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "original" => Ok(ArtifactKind::Original),
            "compressed" => Ok(ArtifactKind::Compressed),
            other => Err(format!("unknown artifact kind `{}`", other)),
        }
    }
}

/// An original/compressed pair sharing one stored filename.
///
/// The stored filename is generated at upload time and is the only
/// correlation key between `input/` and `output/`.
#[derive(Clone, Debug, PartialEq)]
pub struct Artifact {
    /// Stored filename, `{timestamp_ms}-{random}{.ext}`.
    pub filename: String,

    /// Size of the original upload in bytes; 0 when the original is gone.
    pub original_size: u64,

    /// Size of the compressed output in bytes.
    pub compressed_size: u64,
}

impl Artifact {
    /// Percentage of bytes saved by compression.
    ///
    /// Negative when the output grew. Zero when there is no original to
    /// compare against.
    pub fn savings_percent(&self) -> f64 {
        if self.original_size == 0 {
            return 0.0;
        }
        let ratio = self.compressed_size as f64 / self.original_size as f64;
        ((1.0 - ratio) * 10_000.0).round() / 100.0
    }
}

/// Image formats the compression adapter knows how to shrink.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Svg,
    Gif,
}

impl ImageFormat {
    /// Detect the format from a file extension, ignoring case.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(ImageFormat::Jpeg),
            "png" => Some(ImageFormat::Png),
            "svg" => Some(ImageFormat::Svg),
            "gif" => Some(ImageFormat::Gif),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
            ImageFormat::Svg => "image/svg+xml",
            ImageFormat::Gif => "image/gif",
        }
    }
}
