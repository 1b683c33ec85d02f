use anyhow::{Context, Result, bail};
use clap::Parser;
use std::{env, path::PathBuf, str::FromStr, time::Duration};

use crate::services::compression_service::CompressionSettings;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: PathBuf,
    pub retention: Duration,
    /// Zero disables the in-process janitor loop.
    pub cleanup_interval: Duration,
    pub max_upload_bytes: usize,
    pub compression: CompressionSettings,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Session-scoped image compression service")]
pub struct Args {
    /// Host to bind to (overrides SQUEEZE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides SQUEEZE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Root directory holding one folder per session (overrides SQUEEZE_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<PathBuf>,

    /// Age in seconds after which session files are swept (overrides SQUEEZE_RETENTION_SECS)
    #[arg(long)]
    pub retention_secs: Option<u64>,

    /// Run the janitor every N seconds, 0 to disable (overrides SQUEEZE_CLEANUP_INTERVAL_SECS)
    #[arg(long)]
    pub cleanup_interval_secs: Option<u64>,

    /// Maximum accepted request body for uploads (overrides SQUEEZE_MAX_UPLOAD_BYTES)
    #[arg(long)]
    pub max_upload_bytes: Option<usize>,

    /// JPEG re-encode quality, 1-100 (overrides SQUEEZE_JPEG_QUALITY)
    #[arg(long)]
    pub jpeg_quality: Option<u8>,

    /// PNG quantization band as `min-max` (overrides SQUEEZE_PNG_QUALITY)
    #[arg(long)]
    pub png_quality: Option<String>,

    /// GIF palette size (overrides SQUEEZE_GIF_COLORS)
    #[arg(long)]
    pub gif_colors: Option<u16>,

    /// mozjpeg `cjpeg` executable (overrides SQUEEZE_CJPEG_BIN)
    #[arg(long)]
    pub cjpeg_bin: Option<String>,

    /// `pngquant` executable (overrides SQUEEZE_PNGQUANT_BIN)
    #[arg(long)]
    pub pngquant_bin: Option<String>,

    /// `svgo` executable (overrides SQUEEZE_SVGO_BIN)
    #[arg(long)]
    pub svgo_bin: Option<String>,

    /// `gifsicle` executable (overrides SQUEEZE_GIFSICLE_BIN)
    #[arg(long)]
    pub gifsicle_bin: Option<String>,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig.
    pub fn from_env_and_args() -> Result<Self> {
        Self::merge(Args::parse())
    }

    /// Merge parsed CLI args over environment values over defaults.
    pub fn merge(args: Args) -> Result<Self> {
        // --- Environment fallback ---
        let env_host = env::var("SQUEEZE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = env_parse("SQUEEZE_PORT", 3000u16)?;
        let env_storage = env::var("SQUEEZE_STORAGE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| env::temp_dir().join("squeeze"));
        let env_retention = env_parse("SQUEEZE_RETENTION_SECS", 3600u64)?;
        let env_interval = env_parse("SQUEEZE_CLEANUP_INTERVAL_SECS", 0u64)?;
        let env_max_upload = env_parse("SQUEEZE_MAX_UPLOAD_BYTES", 50 * 1024 * 1024usize)?;

        let defaults = CompressionSettings::default();
        let env_jpeg = env_parse("SQUEEZE_JPEG_QUALITY", defaults.jpeg_quality)?;
        let env_png = env::var("SQUEEZE_PNG_QUALITY").ok();
        let env_gif = env_parse("SQUEEZE_GIF_COLORS", defaults.gif_colors)?;

        let png_quality = match args.png_quality.or(env_png) {
            Some(raw) => parse_quality_band(&raw)?,
            None => defaults.png_quality,
        };

        let compression = CompressionSettings {
            jpeg_quality: args.jpeg_quality.unwrap_or(env_jpeg),
            png_quality,
            gif_colors: args.gif_colors.unwrap_or(env_gif),
            cjpeg_bin: args
                .cjpeg_bin
                .or_else(|| env::var("SQUEEZE_CJPEG_BIN").ok())
                .unwrap_or(defaults.cjpeg_bin),
            pngquant_bin: args
                .pngquant_bin
                .or_else(|| env::var("SQUEEZE_PNGQUANT_BIN").ok())
                .unwrap_or(defaults.pngquant_bin),
            svgo_bin: args
                .svgo_bin
                .or_else(|| env::var("SQUEEZE_SVGO_BIN").ok())
                .unwrap_or(defaults.svgo_bin),
            gifsicle_bin: args
                .gifsicle_bin
                .or_else(|| env::var("SQUEEZE_GIFSICLE_BIN").ok())
                .unwrap_or(defaults.gifsicle_bin),
        };

        if !(1..=100).contains(&compression.jpeg_quality) {
            bail!(
                "jpeg quality must be between 1 and 100, got {}",
                compression.jpeg_quality
            );
        }

        // --- Merge ---
        Ok(Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            retention: Duration::from_secs(args.retention_secs.unwrap_or(env_retention)),
            cleanup_interval: Duration::from_secs(
                args.cleanup_interval_secs.unwrap_or(env_interval),
            ),
            max_upload_bytes: args.max_upload_bytes.unwrap_or(env_max_upload),
            compression,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Read `key` from the environment, falling back to `default` when unset.
fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", key, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", key)),
    }
}

/// Parse a pngquant-style `min-max` quality band.
pub fn parse_quality_band(raw: &str) -> Result<(u8, u8)> {
    let (min, max) = raw
        .split_once('-')
        .with_context(|| format!("quality band `{}` must look like `min-max`", raw))?;
    let min = min
        .trim()
        .parse::<u8>()
        .with_context(|| format!("parsing lower bound of `{}`", raw))?;
    let max = max
        .trim()
        .parse::<u8>()
        .with_context(|| format!("parsing upper bound of `{}`", raw))?;
    if min > max || max > 100 {
        bail!("quality band `{}` must satisfy min <= max <= 100", raw);
    }
    Ok((min, max))
}
