//! Deciding which sources need compiling.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use crate::util::fs::outputs_of;
use crate::util::hash::{ContentHash, hash_file};

/// Result of change detection for one module.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
  /// Sources to compile, in declaration order.
  pub to_compile: Vec<PathBuf>,
  /// Current digest of every source that could be read.
  pub updated: HashMap<PathBuf, ContentHash>,
}

impl ChangeSet {
  pub fn is_empty(&self) -> bool {
    self.to_compile.is_empty()
  }

  /// Updates to persist after compilation; sources that were scheduled are
  /// withheld when compilation failed so they stay changed next time.
  pub fn updates_after(&self, compiled_ok: bool) -> HashMap<PathBuf, ContentHash> {
    if compiled_ok {
      return self.updated.clone();
    }
    self
      .updated
      .iter()
      .filter(|(path, _)| !self.to_compile.contains(path))
      .map(|(path, digest)| (path.clone(), digest.clone()))
      .collect()
  }
}

/// Compute the change set for `files`.
///
/// A source is changed when it has no recorded digest, when its digest
/// differs, or when fewer than `arch_count` of its objects exist.
/// `existing_outputs` reports how many architectures already have an object
/// for a source. With `only_changed` off every source is compiled, but
/// digests are still recorded. An unreadable source counts as changed.
pub fn resolve(
  files: &[PathBuf],
  prior: &HashMap<PathBuf, ContentHash>,
  existing_outputs: impl Fn(&Path) -> usize,
  arch_count: usize,
  only_changed: bool,
) -> ChangeSet {
  let mut set = ChangeSet::default();

  for file in files {
    let current = match hash_file(file) {
      Ok(digest) => Some(digest),
      Err(e) => {
        debug!(file = %file.display(), error = %e, "cannot hash, treating as changed");
        None
      }
    };

    let changed = match (&current, prior.get(file)) {
      (None, _) | (_, None) => true,
      (Some(current), Some(previous)) if current != previous => true,
      (Some(_), Some(_)) => existing_outputs(file) < arch_count,
    };
    trace!(file = %file.display(), changed, "change detection");

    if let Some(digest) = current {
      set.updated.insert(file.clone(), digest);
    }
    if changed || !only_changed {
      set.to_compile.push(file.clone());
    }
  }

  set
}

/// How many of `archs` have an object for `source` under `obj_dir/<arch>/`.
pub fn objects_present(obj_dir: &Path, archs: &[String], source: &Path) -> usize {
  let Some(basename) = source.file_name().map(|n| n.to_string_lossy().into_owned()) else {
    return 0;
  };
  archs
    .iter()
    .filter(|arch| {
      outputs_of(&obj_dir.join(arch.as_str()), &basename)
        .iter()
        .any(|p| p.extension().is_some_and(|e| e == "o"))
    })
    .count()
}
