//! Atomic on-disk persistence for graph and path caches.
//!
//! Files are written to `{path}.tmp`, flushed, then renamed over the target,
//! so a reader never observes a half-written cache. Reads load the whole
//! file into memory.

use crate::error::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

fn ensure_parent(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Atomically replace `path` with `data`.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    ensure_parent(path)?;
    let tmp = tmp_path(path);
    {
        let mut file = File::create(&tmp)?;
        file.write_all(data)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Atomically write `value` as pretty JSON.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    ensure_parent(path)?;
    let tmp = tmp_path(path);
    {
        let file = File::create(&tmp)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, value)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

/// Atomically write `value` in the compact binary encoding.
pub fn write_binary<T: bitcode::Encode + ?Sized>(path: &Path, value: &T) -> Result<()> {
    atomic_write(path, &bitcode::encode(value))
}

pub fn read_binary<T: bitcode::DecodeOwned>(path: &Path) -> Result<T> {
    let bytes = fs::read(path)?;
    Ok(bitcode::decode(&bytes)?)
}

#[cfg(test)]
pub(crate) fn test_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "skynoise_test_{}_{}",
        name,
        std::process::id()
    ));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atomic_write_creates_parent_and_leaves_no_tmp() {
        let dir = test_dir("atomic_write");
        let path = dir.join("nested").join("cache.bin");
        atomic_write(&path, b"first").unwrap();
        atomic_write(&path, b"second").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"second");
        assert!(!tmp_path(&path).exists());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_binary_round_trip_of_predecessors() {
        let dir = test_dir("binary_round_trip");
        let path = dir.join("tree.bin");
        let preds: Vec<u32> = vec![u32::MAX, 0, 1, 1, 3];
        write_binary(&path, &preds).unwrap();
        let loaded: Vec<u32> = read_binary(&path).unwrap();
        assert_eq!(loaded, preds);
        let _ = fs::remove_dir_all(&dir);
    }
}
