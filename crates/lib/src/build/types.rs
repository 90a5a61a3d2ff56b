use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::ConfigError;
use crate::project::package::PackageError;
use crate::session::SessionError;
use crate::toolchain::ToolError;
use crate::util::hash::HashError;

/// Errors surfaced by module and project builds.
#[derive(Debug, Error)]
pub enum BuildError {
  #[error(transparent)]
  Config(#[from] ConfigError),

  /// An external tool failed; `context` names the module and, where it
  /// applies, the file and architecture.
  #[error("{context}: {source}")]
  Tool {
    context: ToolContext,
    #[source]
    source: ToolError,
  },

  #[error("{}{}: {source}", module_prefix(.module), .path.display())]
  Io {
    /// Set once the error has passed out of a module build.
    module: Option<String>,
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error(transparent)]
  Package(#[from] PackageError),

  #[error(transparent)]
  Session(#[from] SessionError),
}

impl BuildError {
  pub fn io(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> BuildError {
    let path = path.into();
    move |source| BuildError::Io {
      module: None,
      path,
      source,
    }
  }

  /// Attributes a filesystem error to module `name` unless it already names one.
  pub fn in_module(self, name: &str) -> Self {
    match self {
      BuildError::Io {
        module: None,
        path,
        source,
      } => BuildError::Io {
        module: Some(name.to_string()),
        path,
        source,
      },
      other => other,
    }
  }

  /// The module the error belongs to, when it came from a module build.
  pub fn module(&self) -> Option<&str> {
    match self {
      BuildError::Tool { context, .. } => Some(&context.module),
      BuildError::Io { module, .. } => module.as_deref(),
      _ => None,
    }
  }
}

impl From<HashError> for BuildError {
  fn from(err: HashError) -> Self {
    BuildError::Io {
      module: None,
      path: err.path,
      source: err.source,
    }
  }
}

fn module_prefix(module: &Option<String>) -> String {
  match module {
    Some(name) => format!("module \"{}\", ", name),
    None => String::new(),
  }
}

/// Where a tool failure happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolContext {
  pub module: String,
  pub file: Option<PathBuf>,
  pub arch: Option<String>,
}

impl ToolContext {
  pub fn module(module: &str) -> Self {
    Self {
      module: module.to_string(),
      file: None,
      arch: None,
    }
  }

  pub fn file(mut self, file: &Path) -> Self {
    self.file = Some(file.to_path_buf());
    self
  }

  pub fn arch(mut self, arch: &str) -> Self {
    self.arch = Some(arch.to_string());
    self
  }

  pub fn wrap(self) -> impl FnOnce(ToolError) -> BuildError {
    move |source| BuildError::Tool { context: self, source }
  }
}

impl fmt::Display for ToolContext {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "module \"{}\"", self.module)?;
    if let Some(file) = &self.file {
      write!(f, ", file \"{}\"", file.display())?;
    }
    if let Some(arch) = &self.arch {
      write!(f, ", arch {}", arch)?;
    }
    Ok(())
  }
}

/// Where a module is in its build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleState {
  Pending,
  Hashing,
  Compiling,
  Linking,
  Staging,
  Done,
  Failed,
}

impl fmt::Display for ModuleState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      ModuleState::Pending => "pending",
      ModuleState::Hashing => "hashing",
      ModuleState::Compiling => "compiling",
      ModuleState::Linking => "linking",
      ModuleState::Staging => "staging",
      ModuleState::Done => "done",
      ModuleState::Failed => "failed",
    };
    f.write_str(name)
  }
}

/// One architecture's object for one source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledArtifact {
  pub source: PathBuf,
  pub arch: String,
  pub object: PathBuf,
}

/// What a successful module build did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleReport {
  pub name: String,
  /// Original source paths that were compiled, in declaration order.
  pub compiled: Vec<PathBuf>,
  pub objects: Vec<CompiledArtifact>,
  /// The merged artifact.
  pub artifact: PathBuf,
  /// False when the existing artifact was reused.
  pub linked: bool,
  /// Directory the artifact was staged into, when packing.
  pub staged: Option<PathBuf>,
}
