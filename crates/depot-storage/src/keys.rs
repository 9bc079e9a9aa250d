//! Shared key rules for storage backends.

use crate::traits::{StorageError, StorageResult};

/// Reject keys that are empty, absolute or contain a parent reference.
pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey("Storage key is empty".to_string()));
    }
    if key.contains("..") || key.starts_with('/') {
        return Err(StorageError::InvalidKey(format!(
            "Storage key contains invalid characters: {}",
            key
        )));
    }
    Ok(())
}

/// Key for a derivative rendition stored next to its source object.
///
/// `media/abc/photo.png` at 200x100 as webp becomes
/// `media/abc/derived/photo_200x100.webp`.
pub fn derivative_key(source_key: &str, width: i32, height: i32, format: &str) -> String {
    let (dir, file) = match source_key.rsplit_once('/') {
        Some((dir, file)) => (Some(dir), file),
        None => (None, source_key),
    };
    let stem = file.rsplit_once('.').map_or(file, |(stem, _)| stem);
    let name = format!("{}_{}x{}.{}", stem, width, height, format);
    match dir {
        Some(dir) => format!("{}/derived/{}", dir, name),
        None => format!("derived/{}", name),
    }
}
