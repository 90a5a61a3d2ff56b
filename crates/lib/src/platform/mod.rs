//! Host platform helpers: storage locations and tool lookup.

pub mod paths;
pub mod tools;

/// Returns true when running on a Linux host, where the toolchain lives under
/// the storage directory instead of Xcode.
pub fn is_linux_host() -> bool {
  cfg!(target_os = "linux")
}
