//! The external tools a build drives.
//!
//! The build stages only talk to a [`Toolchain`]. [`CommandToolchain`] spawns
//! the real compiler, linker, merge and signing tools; tests substitute a
//! recording fake.

mod command;

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

pub use command::{CommandToolchain, ToolRequirements};
pub(crate) use command::run_tool;

/// Errors from running an external tool.
#[derive(Debug, Error)]
pub enum ToolError {
  /// The tool could not be started.
  #[error("failed to run {tool}: {source}")]
  Spawn {
    tool: String,
    #[source]
    source: std::io::Error,
  },

  /// The tool ran and reported failure.
  #[error("{tool} failed{}: {stderr}", exit_suffix(.code))]
  Failed {
    tool: String,
    code: Option<i32>,
    stderr: String,
  },

  /// The tool exceeded the configured per-invocation timeout and was killed.
  #[error("{tool} timed out after {}", format_timeout(.timeout))]
  Timeout { tool: String, timeout: Duration },

  /// The tool succeeded but produced unusable output.
  #[error("{tool}: {message}")]
  BadOutput { tool: String, message: String },
}

fn exit_suffix(code: &Option<i32>) -> String {
  code.map(|c| format!(" with exit code {}", c)).unwrap_or_default()
}

fn format_timeout(timeout: &Duration) -> String {
  humantime::format_duration(*timeout).to_string()
}

/// Source language of a compile job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
  /// C, Objective-C and their preprocessed variants.
  CFamily,
  Swift,
}

/// One (file, architecture) compilation.
#[derive(Debug, Clone)]
pub struct CompileJob<'a> {
  pub language: Language,
  /// The file handed to the compiler, after preprocessing.
  pub source: &'a Path,
  /// Other same-language files in the module, for Swift's cross-file resolution.
  pub siblings: &'a [PathBuf],
  pub arch: &'a str,
  pub output: &'a Path,
  pub args: &'a [String],
}

/// The external collaborators of a build.
pub trait Toolchain: Send + Sync {
  fn compile(&self, job: &CompileJob<'_>) -> Result<(), ToolError>;

  /// Link one architecture's objects into a binary.
  fn link(&self, objects: &[PathBuf], output: &Path, args: &[String]) -> Result<(), ToolError>;

  /// Bundle objects into a static archive.
  fn archive(&self, objects: &[PathBuf], output: &Path) -> Result<(), ToolError>;

  /// Merge single-architecture binaries into one universal binary.
  fn merge_architectures(&self, binaries: &[PathBuf], output: &Path) -> Result<(), ToolError>;

  /// Run the macro preprocessor over `file`, returning its standard output.
  fn preprocess(&self, file: &Path) -> Result<String, ToolError>;

  fn fix_rpath(&self, file: &Path, rpaths: &[String]) -> Result<(), ToolError>;

  fn strip(&self, file: &Path) -> Result<(), ToolError>;

  fn sign(&self, file: &Path, flags: &[String]) -> Result<(), ToolError>;
}

/// Runtime search paths embedded after merging, under the install root.
pub fn rpaths(install_root: &str) -> Vec<String> {
  vec![
    format!("{}/usr/lib/", install_root),
    format!("{}/Library/Frameworks/", install_root),
  ]
}
