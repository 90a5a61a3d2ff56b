//! Turning a staging tree into a Debian package.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info};

use crate::config::{BuildMeta, Compression, ConfigError, Control, MaintainerScript};
use crate::consts::LAYOUT_DIR;
use crate::platform::tools::find_tool;
use crate::toolchain::{ToolError, run_tool};
use crate::util::fs::copy_tree;

#[derive(Debug, Error)]
pub enum PackageError {
  #[error("failed to write {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to copy layout {path}: {source}")]
  Layout {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error(transparent)]
  Packer(#[from] ToolError),
}

fn write_err(path: &Path) -> impl FnOnce(io::Error) -> PackageError {
  let path = path.to_path_buf();
  move |source| PackageError::Write { path, source }
}

/// Builds an archive out of a staging directory.
pub trait Packer: Send + Sync {
  /// Pack `staging` into `output`, returning the written path.
  fn pack(&self, staging: &Path, compression: Compression, output: &Path) -> Result<PathBuf, PackageError>;
}

/// Packs with `dpkg-deb --build`.
#[derive(Debug, Clone)]
pub struct DpkgDebPacker {
  program: PathBuf,
  timeout: Option<Duration>,
}

impl DpkgDebPacker {
  pub fn new(program: PathBuf) -> Self {
    Self { program, timeout: None }
  }

  pub fn from_meta(meta: &BuildMeta) -> Result<Self, ConfigError> {
    let program = find_tool(&meta.tools.dpkg_deb, meta.prefix.as_deref()).ok_or_else(|| ConfigError::ToolNotFound {
      tool: "dpkg-deb",
      name: meta.tools.dpkg_deb.clone(),
    })?;
    Ok(Self {
      program,
      timeout: meta.tool_timeout,
    })
  }
}

impl Packer for DpkgDebPacker {
  fn pack(&self, staging: &Path, compression: Compression, output: &Path) -> Result<PathBuf, PackageError> {
    if let Some(dir) = output.parent() {
      fs::create_dir_all(dir).map_err(write_err(dir))?;
    }
    let args = vec![
      format!("-Z{}", compression.as_str()),
      "--build".to_string(),
      staging.display().to_string(),
      output.display().to_string(),
    ];
    run_tool("dpkg-deb", &self.program, &args, self.timeout)?;
    info!(output = %output.display(), "package written");
    Ok(output.to_path_buf())
  }
}

/// `<id>_<version>_<architecture>.deb`
pub fn package_file_name(control: &Control) -> String {
  format!("{}_{}_{}.deb", control.id, control.version, control.architecture)
}

/// Copy `<project>/layout` into `root`, leaving its `DEBIAN` directory out.
///
/// Returns false when the project has no layout directory.
pub fn copy_layout(project_root: &Path, root: &Path) -> Result<bool, PackageError> {
  let layout = project_root.join(LAYOUT_DIR);
  if !layout.is_dir() {
    return Ok(false);
  }
  copy_tree(&layout, root, &["DEBIAN"]).map_err(|source| PackageError::Layout {
    path: layout.clone(),
    source,
  })?;
  debug!(layout = %layout.display(), root = %root.display(), "copied layout");
  Ok(true)
}

/// Write `DEBIAN/control` and the maintainer scripts under `staging`.
pub fn write_debian(staging: &Path, control: &Control, scripts: &[MaintainerScript]) -> Result<(), PackageError> {
  let debian = staging.join("DEBIAN");
  fs::create_dir_all(&debian).map_err(write_err(&debian))?;

  let control_path = debian.join("control");
  fs::write(&control_path, control.render()).map_err(write_err(&control_path))?;

  for script in scripts.iter().filter(|s| s.is_known()) {
    let path = debian.join(&script.kind);
    fs::write(&path, &script.content).map_err(write_err(&path))?;
    make_executable(&path)?;
  }
  Ok(())
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<(), PackageError> {
  use std::os::unix::fs::PermissionsExt;
  fs::set_permissions(path, fs::Permissions::from_mode(0o755)).map_err(write_err(path))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<(), PackageError> {
  Ok(())
}
