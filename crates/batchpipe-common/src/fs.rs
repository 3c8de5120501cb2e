//! Crash-safe file helpers
//!
//! Every durable write goes through [`write_atomic`]: the payload is written to
//! a sibling temp file, synced, then renamed over the target. A reader either
//! sees the previous complete file or the new complete file.

use crate::error::Result;
use serde::{de::DeserializeOwned, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Write `data` to `path` atomically, creating parent directories
pub fn write_atomic(path: impl AsRef<Path>, data: &[u8]) -> Result<()> {
    let path = path.as_ref();
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
    if let Some(parent) = parent {
        fs::create_dir_all(parent)?;
    }

    let tmp_path = temp_sibling(path);
    let result = (|| -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
        fs::rename(&tmp_path, path)?;
        Ok(())
    })();

    if let Err(err) = result {
        let _ = fs::remove_file(&tmp_path);
        return Err(err.into());
    }

    // Persist the rename itself; not supported on every platform.
    if let Some(parent) = parent {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }

    Ok(())
}

/// Serialize `value` as pretty JSON and write it atomically
pub fn write_json_atomic<T: Serialize>(path: impl AsRef<Path>, value: &T) -> Result<()> {
    let mut content = serde_json::to_vec_pretty(value)?;
    content.push(b'\n');
    write_atomic(path, &content)
}

/// Read a JSON document, returning `None` when the file does not exist
pub fn read_json_opt<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<Option<T>> {
    match fs::read(path.as_ref()) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

/// First non-existing path of the form `dir/stem.ext`, `dir/stem_1.ext`, ...
pub fn unique_path(dir: impl AsRef<Path>, stem: &str, ext: &str) -> PathBuf {
    let dir = dir.as_ref();
    let mut candidate = dir.join(format!("{stem}.{ext}"));
    let mut counter = 1;
    while candidate.exists() {
        candidate = dir.join(format!("{stem}_{counter}.{ext}"));
        counter += 1;
    }
    candidate
}

fn temp_sibling(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "state".to_string());
    let seq = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    path.with_file_name(format!(".{file_name}.{}.{seq}.tmp", std::process::id()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Marker {
        name: String,
        count: u32,
    }

    #[test]
    fn test_write_atomic_creates_parents_and_replaces() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/deeper/state.json");

        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"second");
        let leftovers: Vec<_> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_json_roundtrip_and_missing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("marker.json");

        assert!(read_json_opt::<Marker>(&path).unwrap().is_none());

        let marker = Marker {
            name: "a".to_string(),
            count: 3,
        };
        write_json_atomic(&path, &marker).unwrap();
        assert_eq!(read_json_opt::<Marker>(&path).unwrap(), Some(marker));
    }

    #[test]
    fn test_unique_path_never_overwrites() {
        let dir = TempDir::new().unwrap();
        let first = unique_path(dir.path(), "batch_x", "jsonl");
        assert_eq!(first, dir.path().join("batch_x.jsonl"));
        fs::write(&first, b"").unwrap();

        let second = unique_path(dir.path(), "batch_x", "jsonl");
        assert_eq!(second, dir.path().join("batch_x_1.jsonl"));
    }
}
