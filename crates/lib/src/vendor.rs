//! Shared third-party checkouts under the storage directory.
//!
//! Headers and libraries every module builds against, and the macro
//! preprocessor, are cloned once into `<storage>/vendor` and reused by every
//! project on the host.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::consts::{HEADERS_REPO, LIBRARIES_BRANCH, LIBRARIES_REPO, PREPROCESSOR_REPO};
use crate::platform::paths::vendor_dir;
use crate::toolchain::{ToolError, run_tool};

/// Locations of the vendored checkouts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VendorDirs {
  pub headers: PathBuf,
  pub lib: PathBuf,
  pub logos: PathBuf,
}

impl VendorDirs {
  /// The checkouts under `<storage>/vendor`.
  pub fn from_storage() -> Self {
    Self::under(&vendor_dir())
  }

  pub fn under(root: &Path) -> Self {
    Self {
      headers: root.join("headers"),
      lib: root.join("lib"),
      logos: root.join("logos"),
    }
  }

  /// The bundled preprocessor script.
  pub fn preprocessor(&self) -> PathBuf {
    self.logos.join("bin").join("logos.pl")
  }

  /// Clone whatever is missing. The preprocessor is only fetched when asked for.
  ///
  /// `on_fetch` is called with a short name before each clone.
  pub fn ensure(&self, git: &Path, with_preprocessor: bool, on_fetch: impl Fn(&str)) -> Result<(), ToolError> {
    let mut wanted = vec![
      ("headers", HEADERS_REPO, None, &self.headers),
      ("libraries", LIBRARIES_REPO, Some(LIBRARIES_BRANCH), &self.lib),
    ];
    if with_preprocessor {
      wanted.push(("preprocessor", PREPROCESSOR_REPO, None, &self.logos));
    }

    for (what, url, branch, dest) in wanted {
      if dest.exists() {
        debug!(what, path = %dest.display(), "vendor checkout present");
        continue;
      }
      on_fetch(what);
      clone(git, url, branch, dest)?;
    }
    Ok(())
  }
}

fn clone(git: &Path, url: &str, branch: Option<&str>, dest: &Path) -> Result<(), ToolError> {
  if let Some(parent) = dest.parent() {
    std::fs::create_dir_all(parent).map_err(|source| ToolError::Spawn {
      tool: "git".to_string(),
      source,
    })?;
  }

  let mut args = vec!["clone".to_string()];
  if let Some(branch) = branch {
    args.push("--branch".to_string());
    args.push(branch.to_string());
  }
  args.push(url.to_string());
  args.push(dest.display().to_string());
  args.push("--recursive".to_string());

  info!(url, dest = %dest.display(), "cloning");
  run_tool("git", git, &args, None).map(|_| ())
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  #[test]
  fn layout_under_root() {
    let dirs = VendorDirs::under(Path::new("/store/vendor"));
    assert_eq!(dirs.headers, PathBuf::from("/store/vendor/headers"));
    assert_eq!(dirs.preprocessor(), PathBuf::from("/store/vendor/logos/bin/logos.pl"));
  }

  #[test]
  fn present_checkouts_are_not_fetched() {
    let temp = TempDir::new().unwrap();
    let dirs = VendorDirs::under(temp.path());
    std::fs::create_dir_all(&dirs.headers).unwrap();
    std::fs::create_dir_all(&dirs.lib).unwrap();

    let fetched = std::cell::RefCell::new(Vec::new());
    dirs
      .ensure(Path::new("/nonexistent/git"), false, |what| fetched.borrow_mut().push(what.to_string()))
      .unwrap();
    assert!(fetched.borrow().is_empty());
  }

  #[cfg(unix)]
  #[test]
  fn missing_checkouts_are_cloned() {
    use std::os::unix::fs::PermissionsExt;

    let temp = TempDir::new().unwrap();
    let log = temp.path().join("git.log");
    let git = temp.path().join("git");
    std::fs::write(
      &git,
      format!("#!/bin/sh\necho \"$@\" >> {}\n", log.display()),
    )
    .unwrap();
    std::fs::set_permissions(&git, std::fs::Permissions::from_mode(0o755)).unwrap();

    let dirs = VendorDirs::under(&temp.path().join("vendor"));
    let fetched = std::cell::RefCell::new(Vec::new());
    dirs
      .ensure(&git, true, |what| fetched.borrow_mut().push(what.to_string()))
      .unwrap();

    assert_eq!(*fetched.borrow(), vec!["headers", "libraries", "preprocessor"]);
    let calls = std::fs::read_to_string(&log).unwrap();
    assert!(calls.contains("--branch rootless https://github.com/elihwyma/lib"));
    assert_eq!(calls.lines().count(), 3);
  }
}
