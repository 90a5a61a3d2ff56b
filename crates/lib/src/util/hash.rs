//! Content hashing used for change detection.
//!
//! This module provides:
//! - `ContentHash`: a 64-character hex digest of a file's bytes
//! - `hash_file()`: chunked single file hashing
//! - `hash_bytes()`: arbitrary byte hashing
//!
//! The digest is a change detector, not a security boundary. It only has to be
//! stable across hosts and call order.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::consts::HASH_CHUNK_SIZE;

/// A full 64-character SHA256 hash of some content.
///
/// # Format
///
/// The hash is a lowercase hexadecimal string (64 characters).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(pub String);

impl std::fmt::Display for ContentHash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

impl From<&str> for ContentHash {
  fn from(value: &str) -> Self {
    ContentHash(value.to_string())
  }
}

/// Error while reading a file to hash it.
#[derive(Debug, thiserror::Error)]
#[error("failed to read {path}: {source}")]
pub struct HashError {
  pub path: PathBuf,
  #[source]
  pub source: std::io::Error,
}

/// Hash a file's contents.
///
/// Reads in fixed-size chunks so large sources never need to be held in memory.
pub fn hash_file(path: &Path) -> Result<ContentHash, HashError> {
  let wrap = |source| HashError {
    path: path.to_path_buf(),
    source,
  };

  let mut file = fs::File::open(path).map_err(wrap)?;
  let mut hasher = Sha256::new();
  let mut buffer = vec![0u8; HASH_CHUNK_SIZE];

  loop {
    let bytes_read = file.read(&mut buffer).map_err(wrap)?;
    if bytes_read == 0 {
      break;
    }
    hasher.update(&buffer[..bytes_read]);
  }

  Ok(ContentHash(hex::encode(hasher.finalize())))
}

/// Hash arbitrary bytes.
pub fn hash_bytes(data: &[u8]) -> ContentHash {
  let mut hasher = Sha256::new();
  hasher.update(data);
  ContentHash(hex::encode(hasher.finalize()))
}
