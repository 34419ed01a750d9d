//! Deterministic frame ordering for the concat encoder.

use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::utils::filename;
use crate::{Error, Result};

/// How long each source image is displayed, in seconds. At the fixed 5/1
/// output rate this yields five source frames per second of video.
pub const FRAME_DURATION_SECS: f64 = 0.2;

/// A materialized concat manifest.
///
/// The underlying temp file is deleted when the manifest is dropped,
/// after the encode has consumed it.
pub struct FrameManifest {
    file: NamedTempFile,
    frame_count: usize,
}

impl FrameManifest {
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }
}

/// Order a partition's images by capture time and write the concat
/// manifest to a fresh temporary file, so concurrent assemblies for
/// different windows never collide.
///
/// Entries whose names carry no parseable timestamp sort with the Unix
/// epoch, i.e. ahead of every real capture; the sort is stable, so equal
/// timestamps keep their directory order. An empty partition is an error:
/// there is nothing to assemble.
pub async fn build_manifest(partition: &Path) -> Result<FrameManifest> {
    let partition = tokio::fs::canonicalize(partition).await?;

    let mut entries: Vec<(NaiveDateTime, PathBuf)> = Vec::new();
    let mut dir = tokio::fs::read_dir(&partition).await?;
    while let Some(entry) = dir.next_entry().await? {
        let name = entry.file_name();
        let captured_at = name
            .to_str()
            .and_then(filename::parse_image_timestamp)
            .unwrap_or(NaiveDateTime::UNIX_EPOCH);
        entries.push((captured_at, entry.path()));
    }

    if entries.is_empty() {
        return Err(Error::EmptyPartition { dir: partition });
    }
    entries.sort_by_key(|(captured_at, _)| *captured_at);

    let mut file = NamedTempFile::new()?;
    {
        let mut writer = BufWriter::new(file.as_file_mut());
        for (_, path) in &entries {
            writeln!(writer, "file '{}'", path.display())?;
            writeln!(writer, "duration {FRAME_DURATION_SECS}")?;
        }
        writer.flush()?;
    }

    debug!(
        frames = entries.len(),
        manifest = %file.path().display(),
        "concat manifest written"
    );
    Ok(FrameManifest {
        file,
        frame_count: entries.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), b"jpeg").unwrap();
    }

    async fn manifest_lines(dir: &Path) -> Vec<String> {
        let manifest = build_manifest(dir).await.expect("manifest");
        let content = fs::read_to_string(manifest.path()).unwrap();
        let lines: Vec<String> = content.lines().map(str::to_string).collect();
        assert_eq!(lines.len(), manifest.frame_count() * 2);
        lines
    }

    #[tokio::test]
    async fn frames_are_ordered_by_capture_time() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "02-01-2025 10_00_00.jpg");
        touch(dir.path(), "01-01-2025 09_59_59.jpg");
        touch(dir.path(), "01-01-2025 10_00_00.jpg");

        let lines = manifest_lines(dir.path()).await;
        assert_eq!(lines.len(), 6);
        assert!(lines[0].ends_with("01-01-2025 09_59_59.jpg'"));
        assert_eq!(lines[1], "duration 0.2");
        assert!(lines[2].ends_with("01-01-2025 10_00_00.jpg'"));
        assert!(lines[4].ends_with("02-01-2025 10_00_00.jpg'"));
    }

    #[tokio::test]
    async fn manifest_paths_are_absolute() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "01-01-2025 10_00_00.jpg");

        let lines = manifest_lines(dir.path()).await;
        let quoted = lines[0].strip_prefix("file '").unwrap();
        let path = Path::new(quoted.strip_suffix('\'').unwrap());
        assert!(path.is_absolute());
    }

    #[tokio::test]
    async fn unparseable_names_sort_with_the_epoch() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "01-01-2025 10_00_00.jpg");
        touch(dir.path(), "leftover.tmp");

        let lines = manifest_lines(dir.path()).await;
        assert!(lines[0].ends_with("leftover.tmp'"));
        assert!(lines[2].ends_with("01-01-2025 10_00_00.jpg'"));
    }

    #[tokio::test]
    async fn empty_partition_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        match build_manifest(dir.path()).await {
            Err(Error::EmptyPartition { dir: reported }) => {
                assert_eq!(reported, dir.path().canonicalize().unwrap());
            }
            Err(other) => panic!("expected EmptyPartition, got {other:?}"),
            Ok(manifest) => panic!("unexpected manifest with {} frames", manifest.frame_count()),
        }
    }

    #[tokio::test]
    async fn unreadable_partition_is_an_io_error() {
        match build_manifest(Path::new("/definitely/not/here")).await {
            Err(Error::Io(_)) => {}
            Err(other) => panic!("expected Io, got {other:?}"),
            Ok(_) => panic!("unexpected manifest"),
        }
    }
}
