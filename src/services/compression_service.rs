//! Compression adapter.
//!
//! Compression is delegated to external engines (mozjpeg's `cjpeg`,
//! `pngquant`, `svgo`, `gifsicle`). Each call handles exactly one file so a
//! broken input only fails itself, never its batch.

use async_trait::async_trait;
use std::{ffi::OsString, io, path::Path, process::Stdio};
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

use crate::models::artifact::ImageFormat;

#[derive(Debug, Error)]
pub enum CompressError {
    #[error("unsupported image format for `{0}`")]
    Unsupported(String),
    #[error("could not start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("`{program}` exited with {code}: {stderr}")]
    Failed {
        program: String,
        code: String,
        stderr: String,
    },
}

/// Something that turns one image file into a smaller one.
#[async_trait]
pub trait Compressor: Send + Sync {
    /// Read `input` and write the compressed result to `output`.
    async fn compress(&self, input: &Path, output: &Path) -> Result<(), CompressError>;
}

/// Engine binaries and quality knobs.
#[derive(Debug, Clone)]
pub struct CompressionSettings {
    /// mozjpeg quality, 1-100.
    pub jpeg_quality: u8,
    /// pngquant `--quality=min-max` band.
    pub png_quality: (u8, u8),
    /// gifsicle palette size.
    pub gif_colors: u16,
    pub cjpeg_bin: String,
    pub pngquant_bin: String,
    pub svgo_bin: String,
    pub gifsicle_bin: String,
}

impl Default for CompressionSettings {
    fn default() -> Self {
        Self {
            jpeg_quality: 60,
            png_quality: (20, 50),
            gif_colors: 64,
            cjpeg_bin: "cjpeg".into(),
            pngquant_bin: "pngquant".into(),
            svgo_bin: "svgo".into(),
            gifsicle_bin: "gifsicle".into(),
        }
    }
}

/// Shells out to one engine per format.
#[derive(Debug, Clone, Default)]
pub struct CommandCompressor {
    settings: CompressionSettings,
}

impl CommandCompressor {
    pub fn new(settings: CompressionSettings) -> Self {
        Self { settings }
    }

    /// Program and argument list for compressing `input` into `output`.
    fn command_for(
        &self,
        format: ImageFormat,
        input: &Path,
        output: &Path,
    ) -> (&str, Vec<OsString>) {
        let s = &self.settings;
        let input = input.as_os_str().to_os_string();
        let output = output.as_os_str().to_os_string();
        match format {
            ImageFormat::Jpeg => (
                s.cjpeg_bin.as_str(),
                vec![
                    "-quality".into(),
                    s.jpeg_quality.to_string().into(),
                    "-outfile".into(),
                    output,
                    input,
                ],
            ),
            ImageFormat::Png => (
                s.pngquant_bin.as_str(),
                vec![
                    format!("--quality={}-{}", s.png_quality.0, s.png_quality.1).into(),
                    "--force".into(),
                    "--output".into(),
                    output,
                    "--".into(),
                    input,
                ],
            ),
            ImageFormat::Svg => (
                s.svgo_bin.as_str(),
                vec![
                    "--multipass".into(),
                    "-i".into(),
                    input,
                    "-o".into(),
                    output,
                ],
            ),
            ImageFormat::Gif => (
                s.gifsicle_bin.as_str(),
                vec![
                    "--colors".into(),
                    s.gif_colors.to_string().into(),
                    "--use-col=web".into(),
                    "-o".into(),
                    output,
                    input,
                ],
            ),
        }
    }
}

#[async_trait]
impl Compressor for CommandCompressor {
    async fn compress(&self, input: &Path, output: &Path) -> Result<(), CompressError> {
        let format = ImageFormat::from_path(input)
            .ok_or_else(|| CompressError::Unsupported(input.display().to_string()))?;
        let (program, args) = self.command_for(format, input, output);
        debug!("running {} for {}", program, input.display());

        let result = Command::new(program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| CompressError::Spawn {
                program: program.to_string(),
                source,
            })?;

        if result.status.success() {
            Ok(())
        } else {
            Err(CompressError::Failed {
                program: program.to_string(),
                code: result
                    .status
                    .code()
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "signal".into()),
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            })
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Test double standing in for the external engines.
    #[derive(Debug, Clone, Copy)]
    pub enum FakeCompressor {
        /// Keep the first half of the bytes.
        Halve,
        /// Append the input to itself, doubling its size.
        Grow,
        /// Fail every file with a `.bad` extension.
        FailOnBad,
        /// Fail every file.
        AlwaysFail,
        /// Report success for `.svg` files without writing anything; halve the rest.
        SilentOnSvg,
    }

    #[async_trait]
    impl Compressor for FakeCompressor {
        async fn compress(&self, input: &Path, output: &Path) -> Result<(), CompressError> {
            let name = input.display().to_string();
            let marked_bad = input.extension().is_some_and(|ext| ext == "bad");
            let is_svg = input.extension().is_some_and(|ext| ext == "svg");
            let failed = || CompressError::Failed {
                program: "fake".into(),
                code: "1".into(),
                stderr: format!("cannot compress {}", name),
            };
            let bytes = tokio::fs::read(input)
                .await
                .map_err(|source| CompressError::Spawn {
                    program: "fake".into(),
                    source,
                })?;
            let out = match self {
                FakeCompressor::Halve => bytes[..bytes.len() / 2].to_vec(),
                FakeCompressor::Grow => [bytes.as_slice(), bytes.as_slice()].concat(),
                FakeCompressor::FailOnBad if marked_bad => return Err(failed()),
                FakeCompressor::FailOnBad => bytes,
                FakeCompressor::SilentOnSvg if is_svg => return Ok(()),
                FakeCompressor::SilentOnSvg => bytes[..bytes.len() / 2].to_vec(),
                FakeCompressor::AlwaysFail => {
                    // leave a partial file behind like a crashed engine would
                    let _ = tokio::fs::write(output, b"partial").await;
                    return Err(failed());
                }
            };
            tokio::fs::write(output, out)
                .await
                .map_err(|source| CompressError::Spawn {
                    program: "fake".into(),
                    source,
                })
        }
    }
}
