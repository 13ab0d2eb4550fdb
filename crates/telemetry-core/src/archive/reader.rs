//! C6 — Archive reader: enumerate and stream saved prints back to clients.
//! Pure read side; safe to run concurrently with an ongoing writer on the
//! same files (§4.6).

use super::{is_safe_path_component, ArchiveError};
use std::path::PathBuf;
use telemetry_protocol::EnrichedPacket;
use tokio::io::AsyncBufReadExt;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub date: String,
    pub filename: String,
    pub size_bytes: u64,
    pub modified_ms: i64,
}

pub struct ArchiveReader {
    root: PathBuf,
}

impl ArchiveReader {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// List every saved print, excluding dotfiles/dot-directories, sorted
    /// lexicographically by `(date, filename)`.
    pub async fn list_archives(&self) -> std::io::Result<Vec<ArchiveEntry>> {
        let mut entries = Vec::new();

        let mut date_dirs = match tokio::fs::read_dir(&self.root).await {
            Ok(read_dir) => read_dir,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(entries),
            Err(error) => return Err(error),
        };

        while let Some(date_dir) = date_dirs.next_entry().await? {
            if !date_dir.file_type().await?.is_dir() {
                continue;
            }
            let date = date_dir.file_name().to_string_lossy().into_owned();
            if date.starts_with('.') {
                continue;
            }

            let mut files = tokio::fs::read_dir(date_dir.path()).await?;
            while let Some(file) = files.next_entry().await? {
                let file_name = file.file_name().to_string_lossy().into_owned();
                if file_name.starts_with('.') {
                    continue;
                }
                let Some(filename) = file_name.strip_suffix(".records") else {
                    continue;
                };
                let metadata = file.metadata().await?;
                let modified_ms = metadata
                    .modified()
                    .ok()
                    .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                    .map(|d| d.as_millis() as i64)
                    .unwrap_or_default();
                entries.push(ArchiveEntry {
                    date: date.clone(),
                    filename: filename.to_owned(),
                    size_bytes: metadata.len(),
                    modified_ms,
                });
            }
        }

        entries.sort_by(|a, b| (&a.date, &a.filename).cmp(&(&b.date, &b.filename)));
        Ok(entries)
    }

    /// Read one archive file, skipping (and warning on) any line that fails
    /// to parse — most commonly a truncated trailing record.
    ///
    /// `date` and `filename` usually arrive straight from HTTP path
    /// segments; both are rejected if they contain a path separator or a
    /// `..` component rather than being joined onto `root` unchecked.
    pub async fn read_archive(&self, date: &str, filename: &str) -> Result<ReadArchive, ArchiveError> {
        if !is_safe_path_component(date) || !is_safe_path_component(filename) {
            return Err(ArchiveError::InvalidPathComponent(format!("{date}/{filename}")));
        }
        let path = self.root.join(date).join(format!("{filename}.records"));
        let file = tokio::fs::File::open(&path).await?;
        let mut lines = tokio::io::BufReader::new(file).lines();

        let mut packets = Vec::new();
        let mut skipped = 0u64;
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            match EnrichedPacket::from_line(&line) {
                Ok(packet) => packets.push(packet),
                Err(error) => {
                    skipped += 1;
                    warn!(%date, %filename, %error, "skipping unreadable archive record");
                }
            }
        }
        Ok(ReadArchive { packets, skipped })
    }
}

/// Result of reading one archive file: the successfully parsed packets
/// plus a count of lines that failed to parse and were skipped.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadArchive {
    pub packets: Vec<EnrichedPacket>,
    pub skipped: u64,
}
