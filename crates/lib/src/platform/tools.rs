//! Locating external tools on the host.

use std::path::{Path, PathBuf};

/// Search `PATH` for an executable named `name`.
pub fn find_in_path(name: &str) -> Option<PathBuf> {
  let path_var = std::env::var_os("PATH")?;
  std::env::split_paths(&path_var)
    .map(|dir| dir.join(name))
    .find(|candidate| is_executable(candidate))
}

/// Resolve a configured tool.
///
/// A value containing a path separator is taken literally. A bare name is
/// looked up under `prefix` first (when one is configured), then on `PATH`.
pub fn find_tool(name: &str, prefix: Option<&Path>) -> Option<PathBuf> {
  if name.is_empty() {
    return None;
  }

  let literal = Path::new(name);
  if literal.components().count() > 1 || literal.is_absolute() {
    return is_executable(literal).then(|| literal.to_path_buf());
  }

  if let Some(prefix) = prefix {
    let candidate = prefix.join(name);
    if is_executable(&candidate) {
      return Some(candidate);
    }
  }

  find_in_path(name)
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
  use std::os::unix::fs::PermissionsExt;
  path
    .metadata()
    .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
    .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
  path.is_file()
}
