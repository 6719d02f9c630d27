#![allow(clippy::result_large_err)]

use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::Path;

/// Create `dir` and any missing parents.
pub fn ensure_dir(dir: &Path) -> Result<(), AppError> {
    fs::create_dir_all(dir).map_err(|err| {
        AppError::new(
            ErrorCategory::IoError,
            format!("failed to create directory {}: {}", dir.display(), err),
        )
        .with_code("RS-IO-001")
    })
}

/// Write `data` to a temp file next to `path`, then rename it into place.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<(), AppError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    ensure_dir(parent)?;

    let mut temp = tempfile::NamedTempFile::new_in(parent).map_err(|err| {
        AppError::new(
            ErrorCategory::IoError,
            format!("failed to create temp file in {}: {}", parent.display(), err),
        )
        .with_code("RS-IO-002")
    })?;
    temp.write_all(data)
        .and_then(|_| temp.flush())
        .map_err(|err| {
            AppError::new(
                ErrorCategory::IoError,
                format!("failed to write {}: {}", path.display(), err),
            )
            .with_code("RS-IO-002")
        })?;
    temp.persist(path).map_err(|err| {
        AppError::new(
            ErrorCategory::IoError,
            format!("failed to replace {}: {}", path.display(), err.error),
        )
        .with_code("RS-IO-002")
    })?;
    Ok(())
}

pub fn compute_sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
