//! Mtime fingerprint of a project's source tree.
//!
//! The digest covers the sorted `(path, mtime_ns)` pairs of every recognized
//! source file under the project root, so any touch of a source file changes
//! the fingerprint while build artifacts and vendored trees are ignored.

use crate::error::Result;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use std::time::UNIX_EPOCH;

const SOURCE_EXTENSIONS: &[&str] = &[
    "py", "go", "ts", "js", "rs", "java", "c", "h", "cpp", "hpp",
];

const SKIPPED_DIRS: &[&str] = &["vendor", "node_modules", "__pycache__", "venv"];

/// Computes the SHA-256 fingerprint of all source-file mtimes under
/// `project_path`. Deterministic on an unchanged tree; unreadable entries are
/// skipped so permission glitches do not poison the digest.
pub fn fingerprint(project_path: &Path) -> Result<String> {
    let abs_path = std::path::absolute(project_path)?;

    let mut lines = Vec::new();
    collect(&abs_path, &mut lines);
    lines.sort();

    let mut hasher = Sha256::new();
    for line in &lines {
        hasher.update(line.as_bytes());
    }
    Ok(hex_digest(&hasher.finalize()))
}

fn collect(dir: &Path, lines: &mut Vec<String>) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            log::debug!("fingerprint: skipping {}: {e}", dir.display());
            return;
        }
    };
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        let path = entry.path();
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if file_type.is_dir() {
            if name.starts_with('.') || SKIPPED_DIRS.contains(&name.as_str()) {
                continue;
            }
            collect(&path, lines);
            continue;
        }
        if !file_type.is_file() || !has_source_extension(&path) {
            continue;
        }
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        let Ok(modified) = metadata.modified() else {
            continue;
        };
        let mtime_ns = modified
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        lines.push(format!("{}:{}", path.display(), mtime_ns));
    }
}

fn has_source_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| SOURCE_EXTENSIONS.contains(&e))
}

fn hex_digest(bytes: &[u8]) -> String {
    use std::fmt::Write;

    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}
