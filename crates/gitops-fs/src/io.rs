//! Atomic I/O operations with file locking

use crate::{Error, NormalizedPath, Result};
use fs2::FileExt;
use std::fs::{self, OpenOptions};
use std::io::Write;

/// Write content atomically to a file with locking.
///
/// Uses write-to-temp-then-rename strategy to prevent partial writes.
/// Acquires an advisory lock to prevent concurrent access.
pub fn write_atomic(path: &NormalizedPath, content: &[u8]) -> Result<()> {
    let native_path = path.to_native();

    if let Some(parent) = native_path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }

    // Temp file in the same directory keeps the rename on one filesystem
    let temp_name = format!(
        ".{}.{}.tmp",
        native_path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default(),
        std::process::id()
    );
    let temp_path = native_path.with_file_name(&temp_name);

    let mut temp_file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&temp_path)
        .map_err(|e| Error::io(&temp_path, e))?;

    temp_file.lock_exclusive().map_err(|_| Error::LockFailed {
        path: native_path.clone(),
    })?;

    temp_file
        .write_all(content)
        .map_err(|e| Error::io(&temp_path, e))?;
    temp_file.sync_all().map_err(|e| Error::io(&temp_path, e))?;

    temp_file.unlock().map_err(|_| Error::LockFailed {
        path: native_path.clone(),
    })?;

    fs::rename(&temp_path, &native_path).map_err(|e| Error::io(&native_path, e))?;

    Ok(())
}

/// Read text content from a file.
pub fn read_text(path: &NormalizedPath) -> Result<String> {
    let native_path = path.to_native();
    fs::read_to_string(&native_path).map_err(|e| Error::io(&native_path, e))
}

/// Write text content to a file atomically.
pub fn write_text(path: &NormalizedPath, content: &str) -> Result<()> {
    write_atomic(path, content.as_bytes())
}

/// Create a directory and all of its parents.
///
/// Returns `true` when the directory did not exist before the call.
pub fn ensure_dir(path: &NormalizedPath) -> Result<bool> {
    if path.is_dir() {
        return Ok(false);
    }
    let native = path.to_native();
    fs::create_dir_all(&native).map_err(|e| Error::io(&native, e))?;
    Ok(true)
}

/// Move a file, creating the destination's parent directories.
pub fn move_file(from: &NormalizedPath, to: &NormalizedPath) -> Result<()> {
    if let Some(parent) = to.parent() {
        ensure_dir(&parent)?;
    }
    let source = from.to_native();
    fs::rename(&source, to.to_native()).map_err(|e| Error::io(&source, e))
}

/// List every file below `root`, as paths relative to it, sorted.
///
/// Directories named in `skip_dirs` are not descended into at any depth.
pub fn list_files(root: &NormalizedPath, skip_dirs: &[&str]) -> Result<Vec<NormalizedPath>> {
    let mut files = Vec::new();
    let mut pending = vec![root.clone()];

    while let Some(dir) = pending.pop() {
        let native = dir.to_native();
        let entries = fs::read_dir(&native).map_err(|e| Error::io(&native, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| Error::io(&native, e))?;
            let name = entry.file_name().to_string_lossy().to_string();
            let path = dir.join(&name);
            let file_type = entry.file_type().map_err(|e| Error::io(entry.path(), e))?;
            if file_type.is_dir() {
                if !skip_dirs.contains(&name.as_str()) {
                    pending.push(path);
                }
            } else if let Some(relative) = path.strip_prefix(root) {
                files.push(relative);
            }
        }
    }

    files.sort();
    Ok(files)
}
