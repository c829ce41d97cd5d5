//! Shared helpers: atomic file writes, bounded text and JSON extraction.

use crate::errors::{RefactorError, Result};
use std::io::{self, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// Write `contents` to `path` so that readers see either the old file or the
/// complete new one, never a partial write.
///
/// The data goes to a hidden temp file in the same directory, is flushed,
/// then renamed over the target.
pub fn atomic_write(path: &Path, contents: &[u8]) -> Result<()> {
    let tmp = staged(path, contents)?;
    tmp.persist(path)
        .map_err(|e| RefactorError::io(path, e.error))?;
    Ok(())
}

/// Like [`atomic_write`] but never replaces an existing file.
///
/// Returns `Ok(false)` when `path` already exists; the existing file is left
/// untouched and the staged data is discarded.
pub fn atomic_create(path: &Path, contents: &[u8]) -> Result<bool> {
    let tmp = staged(path, contents)?;
    match tmp.persist_noclobber(path) {
        Ok(_) => Ok(true),
        Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(RefactorError::io(path, e.error)),
    }
}

/// Hidden, flushed temp file next to `path` holding `contents`.
fn staged(path: &Path, contents: &[u8]) -> Result<NamedTempFile> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).map_err(|e| RefactorError::io(dir, e))?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".tmp-")
        .suffix(".partial")
        .tempfile_in(dir)
        .map_err(|e| RefactorError::io(dir, e))?;
    tmp.write_all(contents)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| RefactorError::io(tmp.path().to_path_buf(), e))?;
    Ok(tmp)
}

/// Serialize `value` as pretty JSON and write it atomically.
pub fn atomic_write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).map_err(|e| RefactorError::json(path, e))?;
    atomic_write(path, json.as_bytes())
}

/// Cut `text` to at most `max_chars` characters, appending a visible marker
/// that states how much was dropped.
pub fn truncate_with_marker(text: &str, max_chars: usize) -> String {
    let total = text.chars().count();
    if total <= max_chars {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_chars).collect();
    format!("{}\n[... truncated {} chars]", kept, total - max_chars)
}

/// Extract a JSON object from text that may contain other content.
/// Uses brace-counting to find the outermost JSON object.
pub fn extract_json_object(text: &str) -> Option<String> {
    let start = text.find('{')?;
    let mut depth = 0;
    let mut end = start;

    for (i, ch) in text[start..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    end = start + i + 1;
                    break;
                }
            }
            _ => {}
        }
    }

    if depth == 0 && end > start {
        Some(text[start..end].to_string())
    } else {
        None
    }
}
