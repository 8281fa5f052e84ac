//! Upload persistence.
//!
//! Every uploaded file is written to the upload directory under its original
//! name before parsing, mirroring how a hosted chat UI keeps the raw upload.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use crate::models::UploadedFile;

/// Write `file` to `dir/<name>` and return the written path.
///
/// Only the final component of the upload name is used, so names like
/// `../../etc/passwd` or `C:\tmp\a.pdf` cannot escape `dir`.
pub fn persist_upload(dir: &Path, file: &UploadedFile) -> Result<PathBuf> {
    let name = safe_file_name(&file.name)
        .with_context(|| format!("Invalid upload file name: {:?}", file.name))?;

    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create upload directory: {}", dir.display()))?;
    let path = dir.join(name);
    std::fs::write(&path, &file.bytes)
        .with_context(|| format!("Failed to write upload: {}", path.display()))?;

    debug!(path = %path.display(), bytes = file.bytes.len(), "upload persisted");
    Ok(path)
}

fn safe_file_name(name: &str) -> Option<&str> {
    let last = name.rsplit(['/', '\\']).next()?.trim();
    match last {
        "" | "." | ".." => None,
        other => Some(other),
    }
}
