//! Process-wide build state.
//!
//! A [`BuildSession`] owns the loaded [`HashList`], the worker pool every
//! fan-out runs on, and the output lock that serializes progress reporting.
//! It lives for one build invocation. Inheriting submodules share their
//! parent's session through an `Arc`; independent ones open their own over
//! their own scratch directory and reuse the parent's pool.

mod hashlist;
mod report;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::debug;

pub use hashlist::{HashList, SessionError};
pub use report::{BuildEvent, Reporter, TracingReporter};

use crate::consts::{BIN_DIR, DYLIB_DIR, HASHLIST_FILENAME, OBJ_DIR, PROCESSED_DIR};
use crate::util::hash::ContentHash;

pub struct BuildSession {
  scratch: PathBuf,
  hashes: Mutex<HashList>,
  pool: Arc<ThreadPool>,
  output: Mutex<()>,
  reporter: Arc<dyn Reporter>,
  nonce: String,
}

impl std::fmt::Debug for BuildSession {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("BuildSession")
      .field("scratch", &self.scratch)
      .field("nonce", &self.nonce)
      .finish_non_exhaustive()
  }
}

fn session_nonce() -> String {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .map(|d| d.as_millis())
    .unwrap_or_default()
    .to_string()
}

impl BuildSession {
  /// Open a session over `scratch`, loading its hash list.
  ///
  /// `jobs` bounds the worker pool; `None` sizes it to the host.
  pub fn open(scratch: &Path, jobs: Option<usize>, reporter: Arc<dyn Reporter>) -> Result<Self, SessionError> {
    let mut builder = ThreadPoolBuilder::new().thread_name(|i| format!("luz-worker-{}", i));
    if let Some(jobs) = jobs {
      builder = builder.num_threads(jobs);
    }
    let pool = builder.build().map_err(|e| SessionError::Pool(e.to_string()))?;
    Self::with_pool(scratch, Arc::new(pool), reporter)
  }

  fn with_pool(scratch: &Path, pool: Arc<ThreadPool>, reporter: Arc<dyn Reporter>) -> Result<Self, SessionError> {
    let hashes = HashList::load(&scratch.join(HASHLIST_FILENAME))?;
    let session = Self {
      scratch: scratch.to_path_buf(),
      hashes: Mutex::new(hashes),
      pool,
      output: Mutex::new(()),
      reporter,
      nonce: session_nonce(),
    };
    debug!(
      scratch = %scratch.display(),
      nonce = %session.nonce,
      threads = session.pool.current_num_threads(),
      "session opened"
    );
    Ok(session)
  }

  /// Open an independent session for a non-inheriting submodule.
  ///
  /// It gets its own hash list and scratch directory but shares the pool,
  /// reporter and object nonce.
  pub fn independent(&self, scratch: &Path) -> Result<Self, SessionError> {
    let mut child = Self::with_pool(scratch, Arc::clone(&self.pool), Arc::clone(&self.reporter))?;
    child.nonce = self.nonce.clone();
    Ok(child)
  }

  pub fn scratch(&self) -> &Path {
    &self.scratch
  }

  /// Build-unique suffix for object file names.
  pub fn nonce(&self) -> &str {
    &self.nonce
  }

  pub fn pool(&self) -> &ThreadPool {
    &self.pool
  }

  /// Per-architecture object directories live under here.
  pub fn obj_dir(&self, module: &str) -> PathBuf {
    self.scratch.join(OBJ_DIR).join(module)
  }

  pub fn dylib_dir(&self, module: &str) -> PathBuf {
    self.scratch.join(DYLIB_DIR).join(module)
  }

  pub fn bin_dir(&self, module: &str) -> PathBuf {
    self.scratch.join(BIN_DIR).join(module)
  }

  pub fn processed_dir(&self, module: &str) -> PathBuf {
    self.scratch.join(PROCESSED_DIR).join(module)
  }

  fn hashes(&self) -> MutexGuard<'_, HashList> {
    self.hashes.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Recorded digests for `files`, copied out so the lock is not held while hashing.
  pub fn prior_hashes(&self, files: &[PathBuf]) -> HashMap<PathBuf, ContentHash> {
    let hashes = self.hashes();
    files
      .iter()
      .filter_map(|f| hashes.get(f).map(|digest| (f.clone(), digest.clone())))
      .collect()
  }

  /// Merge one module's updates in a single critical section.
  pub fn merge_hashes(&self, updates: &HashMap<PathBuf, ContentHash>) {
    if updates.is_empty() {
      return;
    }
    self.hashes().merge(updates);
  }

  pub fn build_number(&self) -> u64 {
    self.hashes().build_number
  }

  /// Increment the debug build counter and return the new value.
  pub fn bump_build_number(&self) -> u64 {
    let mut hashes = self.hashes();
    hashes.build_number += 1;
    hashes.build_number
  }

  /// A copy of the current list.
  pub fn hash_list(&self) -> HashList {
    self.hashes().clone()
  }

  /// Persist the hash list under the scratch directory.
  pub fn save(&self) -> Result<(), SessionError> {
    let snapshot = self.hash_list();
    snapshot.save(&self.scratch.join(HASHLIST_FILENAME))
  }

  /// Hand an event to the reporter while holding the output lock.
  pub fn report(&self, event: BuildEvent) {
    let _guard = self.output.lock().unwrap_or_else(PoisonError::into_inner);
    self.reporter.report(&event);
  }
}
