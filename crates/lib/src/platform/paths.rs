use crate::consts::APP_NAME;
use std::path::PathBuf;

/// Returns the user's home directory
#[cfg(windows)]
pub fn home_dir() -> PathBuf {
  let userprofile = std::env::var("USERPROFILE").unwrap_or_default();
  PathBuf::from(userprofile)
}

/// Returns the user's home directory
#[cfg(not(windows))]
pub fn home_dir() -> PathBuf {
  let home = std::env::var("HOME").unwrap_or_default();
  PathBuf::from(home)
}

/// Returns the storage directory shared by every project: vendor checkouts,
/// SDKs and the Linux toolchain.
///
/// `LUZ_STORAGE` takes precedence over `~/.luz`.
pub fn storage_dir() -> PathBuf {
  std::env::var("LUZ_STORAGE")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir().join(format!(".{}", APP_NAME)))
}

pub fn vendor_dir() -> PathBuf {
  storage_dir().join("vendor")
}

pub fn sdks_dir() -> PathBuf {
  storage_dir().join("sdks")
}
