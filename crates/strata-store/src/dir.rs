//! Directory-backed record store.
//!
//! Each record lives in its own file, `<root>/<key>.rec`, framed as:
//!
//! ```text
//! [4 bytes: payload length (little-endian u32)]
//! [4 bytes: CRC32 of payload (little-endian u32)]
//! [N bytes: payload]
//! ```
//!
//! Writes go to a temporary file in the same directory which is then renamed
//! over the target, so a reader never observes a half-written record.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::traits::RecordStore;

/// File extension for record files.
const RECORD_EXT: &str = "rec";

/// Header size: 4 bytes length + 4 bytes CRC.
const HEADER_SIZE: usize = 8;

/// Configuration for a [`DirRecordStore`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirStoreConfig {
    /// `fsync` every record before it is renamed into place.
    pub fsync: bool,
}

/// Record store keeping one checksummed file per key.
#[derive(Debug)]
pub struct DirRecordStore {
    root: PathBuf,
    config: DirStoreConfig,
}

impl DirRecordStore {
    /// Open (or create) a store rooted at `root`.
    pub fn open(root: impl AsRef<Path>, config: DirStoreConfig) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        debug!(root = %root.display(), "opened directory record store");
        Ok(Self { root, config })
    }

    /// The directory holding the record files.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> StoreResult<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(format!("{key}.{RECORD_EXT}")))
    }
}

/// Keys become file names, so only a conservative character set is allowed.
fn validate_key(key: &str) -> StoreResult<()> {
    let valid = !key.is_empty()
        && !key.starts_with('.')
        && key
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'));
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidKey(key.to_string()))
    }
}

fn encode_frame(payload: &[u8]) -> StoreResult<Vec<u8>> {
    let len = u32::try_from(payload.len()).map_err(|_| {
        StoreError::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            "record larger than 4 GiB",
        ))
    })?;
    let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&crc32fast::hash(payload).to_le_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

fn decode_frame(key: &str, frame: &[u8]) -> StoreResult<Vec<u8>> {
    let corrupt = |reason: String| StoreError::Corrupt {
        key: key.to_string(),
        reason,
    };
    if frame.len() < HEADER_SIZE {
        return Err(corrupt(format!("truncated header ({} bytes)", frame.len())));
    }
    let (header, payload) = frame.split_at(HEADER_SIZE);
    let len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
    let crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
    if payload.len() != len {
        return Err(corrupt(format!(
            "length mismatch: header says {len}, file has {}",
            payload.len()
        )));
    }
    if crc32fast::hash(payload) != crc {
        return Err(corrupt("CRC32 mismatch".into()));
    }
    Ok(payload.to_vec())
}

impl RecordStore for DirRecordStore {
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        match fs::read(&path) {
            Ok(frame) => decode_frame(key, &frame).map(Some),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn put(&self, key: &str, bytes: &[u8]) -> StoreResult<()> {
        let path = self.path_for(key)?;
        let frame = encode_frame(bytes)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&self.root)?;
        tmp.write_all(&frame)?;
        if self.config.fsync {
            tmp.as_file().sync_all()?;
        }
        tmp.persist(&path).map_err(|e| StoreError::Io(e.error))?;

        debug!(key, len = bytes.len(), "stored record");
        Ok(())
    }

    fn exists(&self, key: &str) -> StoreResult<bool> {
        Ok(self.path_for(key)?.is_file())
    }

    fn delete(&self, key: &str) -> StoreResult<bool> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn keys(&self) -> StoreResult<Vec<String>> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXT) {
                continue;
            }
            match path.file_stem().and_then(|s| s.to_str()) {
                Some(stem) if validate_key(stem).is_ok() => keys.push(stem.to_string()),
                _ => warn!(path = %path.display(), "skipping unrecognised record file"),
            }
        }
        keys.sort();
        Ok(keys)
    }
}
