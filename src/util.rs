//! Utility functions for memsearch.

use std::fs;
use std::path::{Component, Path};
use std::sync::{Mutex, MutexGuard};

use crate::error::{MemoryError, Result};

/// Maximum memory file size that is read into the built-in index (2 MB).
pub const MAX_FILE_SIZE: u64 = 2 * 1024 * 1024;

/// Read a file into a string, refusing files larger than `max_size`.
///
/// # Errors
///
/// Returns an error if:
/// * The file cannot be read (doesn't exist, permission denied, etc.)
/// * The file exceeds `max_size`
pub fn read_to_string_with_limit(path: &Path, max_size: u64) -> Result<String> {
    let metadata = fs::metadata(path).map_err(|e| MemoryError::storage(path, e))?;

    let size = metadata.len();
    if size > max_size {
        return Err(MemoryError::backend(format!(
            "File {} is too large ({} bytes, max {} bytes)",
            path.display(),
            size,
            max_size
        )));
    }

    fs::read_to_string(path).map_err(|e| MemoryError::storage(path, e))
}

/// Read a file into a string with the default [`MAX_FILE_SIZE`] limit.
pub fn read_to_string_limited(path: &Path) -> Result<String> {
    read_to_string_with_limit(path, MAX_FILE_SIZE)
}

/// Check that a relative path stays inside its root.
///
/// Rejects absolute paths, prefixes, and any `..` component.
pub fn is_contained_relative(rel_path: &str) -> bool {
    let path = Path::new(rel_path);
    !rel_path.is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Truncate to at most `max_chars` characters on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Lock a mutex, recovering the data if a panicking holder poisoned it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_read_to_string_limited_success() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("MEMORY.md");
        fs::write(&path, "# Memory").unwrap();

        assert_eq!(read_to_string_limited(&path).unwrap(), "# Memory");
    }

    #[test]
    fn test_read_to_string_limited_nonexistent() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("missing.md");

        let err = read_to_string_limited(&path).unwrap_err();
        assert!(matches!(err, MemoryError::Storage { .. }));
    }

    #[test]
    fn test_read_to_string_with_limit_exceeds() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("large.md");

        let mut file = fs::File::create(&path).unwrap();
        file.write_all(&[b'x'; 1000]).unwrap();

        let err = read_to_string_with_limit(&path, 500).unwrap_err().to_string();
        assert!(err.contains("too large"));
        assert!(err.contains("1000 bytes"));
        assert!(err.contains("max 500 bytes"));
    }

    #[test]
    fn test_read_to_string_at_boundary() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("boundary.md");
        fs::write(&path, "x".repeat(100)).unwrap();

        assert!(read_to_string_with_limit(&path, 100).is_ok());
        assert!(read_to_string_with_limit(&path, 99).is_err());
    }

    #[test]
    fn test_is_contained_relative() {
        assert!(is_contained_relative("MEMORY.md"));
        assert!(is_contained_relative("memory/2026-01-01.md"));
        assert!(is_contained_relative("./memory/notes.md"));
        assert!(!is_contained_relative("../secrets.md"));
        assert!(!is_contained_relative("memory/../../etc/passwd"));
        assert!(!is_contained_relative("/etc/passwd"));
        assert!(!is_contained_relative(""));
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("hello", 2), "he");
        assert_eq!(truncate_chars("héllo", 2), "hé");
    }
}
