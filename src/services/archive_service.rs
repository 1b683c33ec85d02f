//! Archive builder: bundles a session's compressed files into one zip.

use std::{
    fs::File,
    io::{self, BufWriter, ErrorKind},
    path::{Path, PathBuf},
};
use tracing::{debug, info};
use uuid::Uuid;
use zip::{CompressionMethod, ZipWriter, write::SimpleFileOptions};

use super::session_service::{ARCHIVE_FILE_NAME, SessionError, SessionResult};

/// Deflate level for the zip container.
const ARCHIVE_COMPRESSION_LEVEL: i64 = 9;

/// Prefix of the in-progress zip written next to the archive.
const TMP_ARCHIVE_PREFIX: &str = ".tmp-";

/// Whether a file in the session root is the archive or an in-progress copy
/// of it. Interrupted builds can leave the latter behind.
pub(crate) fn is_archive_file(name: &str) -> bool {
    name == ARCHIVE_FILE_NAME || (name.starts_with(TMP_ARCHIVE_PREFIX) && name.ends_with(".zip"))
}

/// Rebuild `archive_path` from every regular file directly inside
/// `output_dir`.
///
/// The zip is written to a temporary sibling and renamed into place, so a
/// concurrent reader sees either the previous archive or the new one.
/// Returns `NoCompressedContent` when the directory is missing or empty.
pub async fn build_archive(
    session: &str,
    output_dir: &Path,
    archive_path: &Path,
) -> SessionResult<PathBuf> {
    let files = collect_files(output_dir).await.map_err(|err| {
        if err.kind() == ErrorKind::NotFound {
            SessionError::NoCompressedContent(session.to_string())
        } else {
            SessionError::Io(err)
        }
    })?;
    if files.is_empty() {
        return Err(SessionError::NoCompressedContent(session.to_string()));
    }

    let parent = archive_path
        .parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| {
            SessionError::Io(io::Error::new(
                ErrorKind::Other,
                "archive path missing parent directory",
            ))
        })?;
    let tmp_path = parent.join(format!("{}{}.zip", TMP_ARCHIVE_PREFIX, Uuid::new_v4()));

    let entries = files.len();
    let tmp = tmp_path.clone();
    let written = tokio::task::spawn_blocking(move || write_zip(&tmp, &files))
        .await
        .map_err(|err| SessionError::Io(io::Error::new(ErrorKind::Other, err)))?;
    if let Err(err) = written {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(err);
    }

    if let Err(err) = tokio::fs::rename(&tmp_path, archive_path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(SessionError::Io(err));
    }

    info!(
        "built archive {} with {} entries",
        archive_path.display(),
        entries
    );
    Ok(archive_path.to_path_buf())
}

/// List regular files directly inside `dir`, in enumeration order.
async fn collect_files(dir: &Path) -> io::Result<Vec<(String, PathBuf)>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        files.push((name, entry.path()));
    }
    Ok(files)
}

fn write_zip(target: &Path, files: &[(String, PathBuf)]) -> SessionResult<()> {
    let mut zip = ZipWriter::new(BufWriter::new(File::create(target)?));
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(ARCHIVE_COMPRESSION_LEVEL));

    for (name, path) in files {
        debug!("adding {} to archive", name);
        zip.start_file(name.as_str(), options)?;
        let mut source = File::open(path)?;
        io::copy(&mut source, &mut zip)?;
    }

    let mut writer = zip.finish()?;
    io::Write::flush(&mut writer)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{collections::BTreeMap, io::Read};
    use zip::ZipArchive;

    fn read_zip(path: &Path) -> BTreeMap<String, Vec<u8>> {
        let mut archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
        let mut contents = BTreeMap::new();
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i).unwrap();
            let mut buf = Vec::new();
            entry.read_to_end(&mut buf).unwrap();
            contents.insert(entry.name().to_string(), buf);
        }
        contents
    }

    #[tokio::test]
    async fn archive_contains_exactly_the_output_files() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("output");
        std::fs::create_dir_all(&output).unwrap();
        std::fs::write(output.join("a.png"), b"png bytes \x00\x01\x02").unwrap();
        std::fs::write(output.join("b.jpg"), vec![0xFFu8; 4096]).unwrap();
        // nested directories are not part of the flat archive
        std::fs::create_dir_all(output.join("nested")).unwrap();
        std::fs::write(output.join("nested").join("c.gif"), b"gif").unwrap();

        let zip_path = dir.path().join("compressed.zip");
        build_archive("s1", &output, &zip_path).await.unwrap();

        let contents = read_zip(&zip_path);
        assert_eq!(
            contents.keys().cloned().collect::<Vec<_>>(),
            ["a.png", "b.jpg"]
        );
        assert_eq!(contents["a.png"], b"png bytes \x00\x01\x02");
        assert_eq!(contents["b.jpg"], vec![0xFFu8; 4096]);
    }

    #[tokio::test]
    async fn rebuild_reflects_current_directory() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("output");
        std::fs::create_dir_all(&output).unwrap();
        std::fs::write(output.join("a.png"), b"a").unwrap();
        let zip_path = dir.path().join("compressed.zip");
        build_archive("s1", &output, &zip_path).await.unwrap();

        std::fs::write(output.join("b.png"), b"b").unwrap();
        build_archive("s1", &output, &zip_path).await.unwrap();

        assert_eq!(read_zip(&zip_path).len(), 2);
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".tmp-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn empty_or_missing_output_is_no_compressed_content() {
        let dir = tempfile::tempdir().unwrap();
        let zip_path = dir.path().join("compressed.zip");

        let missing = build_archive("s1", &dir.path().join("output"), &zip_path).await;
        assert!(matches!(missing, Err(SessionError::NoCompressedContent(_))));

        std::fs::create_dir_all(dir.path().join("output")).unwrap();
        let empty = build_archive("s1", &dir.path().join("output"), &zip_path).await;
        assert!(matches!(empty, Err(SessionError::NoCompressedContent(_))));
        assert!(!zip_path.exists());
    }

    #[test]
    fn archive_file_names() {
        assert!(is_archive_file(ARCHIVE_FILE_NAME));
        assert!(is_archive_file(".tmp-3f2a.zip"));
        assert!(!is_archive_file(".tmp-3f2a.png"));
        assert!(!is_archive_file("other.zip"));
    }
}
