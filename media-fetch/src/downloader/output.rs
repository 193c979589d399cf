//! Work directory inspection and cleanup.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::utils::fs::{remove_dir_all_tolerant, remove_file_tolerant};
use crate::{Error, Result};

/// Name of the credential file written into a work directory.
pub const CREDENTIAL_FILE_NAME: &str = "cookies.txt";

/// Partial, temporary and manifest files never count as output.
const NON_USABLE_SUFFIXES: &[&str] = &[
    ".part", ".ytdl", ".tmp", ".temp", ".json", ".m3u8", ".mpd",
];

/// A produced file that qualifies as output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsableFile {
    pub path: PathBuf,
    pub size: u64,
}

pub fn is_usable_name(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    if lower == CREDENTIAL_FILE_NAME || lower.contains(".part-frag") {
        return false;
    }
    !NON_USABLE_SUFFIXES.iter().any(|s| lower.ends_with(s))
}

/// Regular files directly inside `dir`, sorted, excluding `exclude`.
/// A missing directory yields an empty list.
pub async fn list_files(dir: &Path, exclude: Option<&Path>) -> Result<Vec<PathBuf>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(Error::io_path("reading directory", dir, e)),
    };

    let mut files = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| Error::io_path("reading directory", dir, e))?
    {
        let path = entry.path();
        if exclude.is_some_and(|ex| ex == path) {
            continue;
        }
        if entry.file_type().await.is_ok_and(|t| t.is_file()) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Files in `dir` that count as usable output: allowed suffix and nonzero size.
pub async fn usable_files(dir: &Path) -> Result<Vec<UsableFile>> {
    let mut usable = Vec::new();
    for path in list_files(dir, None).await? {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !is_usable_name(name) {
            continue;
        }
        // Files can vanish while an engine post-processes them.
        let Ok(meta) = tokio::fs::metadata(&path).await else {
            continue;
        };
        if meta.len() > 0 {
            usable.push(UsableFile {
                size: meta.len(),
                path,
            });
        }
    }
    Ok(usable)
}

/// Largest file, the one handed to the delivery surface.
pub fn primary_file(files: &[UsableFile]) -> Option<&UsableFile> {
    files.iter().max_by_key(|f| f.size)
}

/// Remove everything in `dir` except the entry at `preserve`.
pub async fn clear_work_dir(dir: &Path, preserve: Option<&Path>) -> Result<()> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(Error::io_path("reading directory", dir, e)),
    };

    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| Error::io_path("reading directory", dir, e))?
    {
        let path = entry.path();
        if preserve.is_some_and(|p| p == path) {
            continue;
        }
        if entry.file_type().await.is_ok_and(|t| t.is_dir()) {
            remove_dir_all_tolerant(&path).await?;
        } else {
            remove_file_tolerant(&path).await?;
        }
    }
    Ok(())
}
