//! The persisted change-detection ledger.
//!
//! # Storage Layout
//!
//! ```text
//! <project>/.luz/
//! └── hashlist.json
//! ```
//!
//! # Example File
//!
//! ```json
//! {
//!   "build_number": 4,
//!   "hashlist": {
//!     "/src/hello/Tweak.x": "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08"
//!   }
//! }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::util::hash::ContentHash;

/// Errors while loading or saving session state.
#[derive(Debug, Error)]
pub enum SessionError {
  #[error("failed to read hash list {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to write hash list {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to create directory {path}: {source}")]
  CreateDir {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse hash list {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("failed to serialize hash list: {0}")]
  Serialize(#[source] serde_json::Error),

  #[error("failed to start worker pool: {0}")]
  Pool(String),
}

/// Map of absolute source path to last-seen digest, plus the debug build counter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashList {
  #[serde(default)]
  pub build_number: u64,
  #[serde(default)]
  pub hashlist: BTreeMap<String, ContentHash>,
}

fn key(path: &Path) -> String {
  path.to_string_lossy().into_owned()
}

impl HashList {
  /// Load the list at `path`. A missing file is an empty list.
  pub fn load(path: &Path) -> Result<Self, SessionError> {
    let content = match fs::read_to_string(path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => {
        debug!(path = %path.display(), "no hash list, starting fresh");
        return Ok(Self::default());
      }
      Err(source) => {
        return Err(SessionError::Read {
          path: path.to_path_buf(),
          source,
        });
      }
    };

    let list: HashList = serde_json::from_str(&content).map_err(|source| SessionError::Parse {
      path: path.to_path_buf(),
      source,
    })?;
    debug!(path = %path.display(), entries = list.hashlist.len(), "loaded hash list");
    Ok(list)
  }

  /// Write the list to `path`.
  ///
  /// Writes to a temp file and renames it into place so an interrupted build
  /// never leaves a truncated list behind.
  pub fn save(&self, path: &Path) -> Result<(), SessionError> {
    if let Some(dir) = path.parent() {
      fs::create_dir_all(dir).map_err(|source| SessionError::CreateDir {
        path: dir.to_path_buf(),
        source,
      })?;
    }

    let content = serde_json::to_string_pretty(self).map_err(SessionError::Serialize)?;
    let temp_path = path.with_extension("json.tmp");
    let write_err = |source| SessionError::Write {
      path: path.to_path_buf(),
      source,
    };
    fs::write(&temp_path, &content).map_err(write_err)?;
    fs::rename(&temp_path, path).map_err(write_err)?;

    info!(path = %path.display(), entries = self.hashlist.len(), "hash list saved");
    Ok(())
  }

  pub fn get(&self, path: &Path) -> Option<&ContentHash> {
    self.hashlist.get(&key(path))
  }

  /// Fold in a module's updates. Entries for other paths are untouched.
  pub fn merge(&mut self, updates: &HashMap<PathBuf, ContentHash>) {
    for (path, digest) in updates {
      self.hashlist.insert(key(path), digest.clone());
    }
  }

  pub fn len(&self) -> usize {
    self.hashlist.len()
  }

  pub fn is_empty(&self) -> bool {
    self.hashlist.is_empty()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  #[test]
  fn missing_file_is_empty() {
    let temp = TempDir::new().unwrap();
    let list = HashList::load(&temp.path().join("hashlist.json")).unwrap();
    assert!(list.is_empty());
    assert_eq!(list.build_number, 0);
  }

  #[test]
  fn save_then_load() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join(".luz").join("hashlist.json");

    let mut list = HashList {
      build_number: 3,
      ..Default::default()
    };
    list.merge(&HashMap::from([(PathBuf::from("/src/a.m"), ContentHash::from("aa"))]));
    list.save(&path).unwrap();

    assert!(!path.with_extension("json.tmp").exists());
    let loaded = HashList::load(&path).unwrap();
    assert_eq!(loaded, list);
    assert_eq!(loaded.get(Path::new("/src/a.m")), Some(&ContentHash::from("aa")));
  }

  #[test]
  fn on_disk_shape() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("hashlist.json");
    let mut list = HashList::default();
    list.merge(&HashMap::from([(PathBuf::from("/src/b.m"), ContentHash::from("bb"))]));
    list.save(&path).unwrap();

    let raw: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(raw["build_number"], 0);
    assert_eq!(raw["hashlist"]["/src/b.m"], "bb");
  }

  #[test]
  fn corrupt_file_is_a_parse_error() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("hashlist.json");
    fs::write(&path, "{not json").unwrap();

    assert!(matches!(HashList::load(&path), Err(SessionError::Parse { .. })));
  }

  #[test]
  fn merge_keeps_other_entries() {
    let mut list = HashList::default();
    list.merge(&HashMap::from([(PathBuf::from("/a"), ContentHash::from("1"))]));
    list.merge(&HashMap::from([(PathBuf::from("/b"), ContentHash::from("2"))]));
    list.merge(&HashMap::from([(PathBuf::from("/a"), ContentHash::from("3"))]));

    assert_eq!(list.len(), 2);
    assert_eq!(list.get(Path::new("/a")), Some(&ContentHash::from("3")));
  }
}
