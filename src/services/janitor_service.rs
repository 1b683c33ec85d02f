//! Janitor: age-based sweep over every session directory.
//!
//! Only files are removed. Session directories, including now-empty
//! `input/` and `output/` folders, are left in place.

use std::{
    io::{self, ErrorKind},
    path::Path,
    time::{Duration, SystemTime},
};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::models::{artifact::ArtifactKind, cleanup::CleanupReport};

use super::archive_service::is_archive_file;

/// Delete every session file under `root` whose modification time is more
/// than `max_age` before `now`.
///
/// A missing root yields an empty report. Errors on individual files are
/// logged and counted, never returned.
pub async fn sweep(root: &Path, max_age: Duration, now: SystemTime) -> CleanupReport {
    let mut report = CleanupReport::default();

    let mut sessions = match fs::read_dir(root).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!("storage root {} missing, nothing to sweep", root.display());
            return report;
        }
        Err(err) => {
            warn!("cannot read storage root {}: {}", root.display(), err);
            report.failures += 1;
            return report;
        }
    };

    loop {
        let session = match sessions.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(err) => {
                warn!("error walking {}: {}", root.display(), err);
                report.failures += 1;
                break;
            }
        };
        let session_path = session.path();
        match session.file_type().await {
            Ok(kind) if kind.is_dir() => {}
            _ => continue,
        }

        for kind in [ArtifactKind::Original, ArtifactKind::Compressed] {
            sweep_dir(&session_path.join(kind.dir_name()), max_age, now, &mut report).await;
        }
        sweep_archives(&session_path, max_age, now, &mut report).await;
    }

    info!(
        "janitor removed {} files ({} failures)",
        report.deleted_count(),
        report.failures
    );
    report
}

async fn sweep_dir(dir: &Path, max_age: Duration, now: SystemTime, report: &mut CleanupReport) {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return,
        Err(err) => {
            warn!("cannot read {}: {}", dir.display(), err);
            report.failures += 1;
            return;
        }
    };

    loop {
        match entries.next_entry().await {
            Ok(Some(entry)) => sweep_file(&entry.path(), max_age, now, report).await,
            Ok(None) => break,
            Err(err) => {
                warn!("error walking {}: {}", dir.display(), err);
                report.failures += 1;
                break;
            }
        }
    }
}

/// Sweep the archive and any leftover in-progress zips in a session root.
async fn sweep_archives(
    session_path: &Path,
    max_age: Duration,
    now: SystemTime,
    report: &mut CleanupReport,
) {
    let mut entries = match fs::read_dir(session_path).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return,
        Err(err) => {
            warn!("cannot read {}: {}", session_path.display(), err);
            report.failures += 1;
            return;
        }
    };

    loop {
        match entries.next_entry().await {
            Ok(Some(entry)) => {
                if is_archive_file(&entry.file_name().to_string_lossy()) {
                    sweep_file(&entry.path(), max_age, now, report).await;
                }
            }
            Ok(None) => break,
            Err(err) => {
                warn!("error walking {}: {}", session_path.display(), err);
                report.failures += 1;
                break;
            }
        }
    }
}

async fn sweep_file(path: &Path, max_age: Duration, now: SystemTime, report: &mut CleanupReport) {
    match remove_if_expired(path, max_age, now).await {
        Ok(true) => {
            debug!("deleted expired file {}", path.display());
            report.deleted_files.push(path.to_path_buf());
        }
        Ok(false) => {}
        // another sweep or request got there first
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => {
            warn!("error deleting file {}: {}", path.display(), err);
            report.failures += 1;
        }
    }
}

async fn remove_if_expired(path: &Path, max_age: Duration, now: SystemTime) -> io::Result<bool> {
    let meta = fs::symlink_metadata(path).await?;
    if !meta.is_file() {
        return Ok(false);
    }
    // mtimes in the future count as age zero
    let age = now
        .duration_since(meta.modified()?)
        .unwrap_or(Duration::ZERO);
    if age <= max_age {
        return Ok(false);
    }
    fs::remove_file(path).await?;
    Ok(true)
}
