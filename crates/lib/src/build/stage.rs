//! Staging built modules into the package tree.
//!
//! The staging tree mirrors the device filesystem:
//!
//! ```text
//! <project>/.luz/_/
//! ├── DEBIAN/
//! └── var/jb/                      (root-prefix policy only)
//!     └── Library/MobileSubstrate/DynamicLibraries/
//!         ├── Hello.dylib
//!         └── Hello.plist
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::types::BuildError;
use crate::config::{Filter, ModuleKind, ModuleSpec};
use crate::consts::{ROOTLESS_PREFIX, STAGING_DIR};
use crate::session::{BuildEvent, BuildSession};
use crate::util::fs::copy_tree;

/// Where a project's package contents are assembled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingLayout {
  staging: PathBuf,
  root: PathBuf,
}

impl StagingLayout {
  pub fn new(scratch: &Path, rootless: bool) -> Self {
    let staging = scratch.join(STAGING_DIR);
    let root = if rootless { staging.join(ROOTLESS_PREFIX) } else { staging.clone() };
    Self { staging, root }
  }

  /// The directory handed to the packer.
  pub fn staging(&self) -> &Path {
    &self.staging
  }

  /// Root of installed files; `staging/var/jb` under the root-prefix policy.
  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn is_rootless(&self) -> bool {
    self.root != self.staging
  }

  pub fn destination(&self, spec: &ModuleSpec) -> PathBuf {
    self.root.join(&spec.install_dir)
  }
}

/// Render the filter descriptor for an injected library.
///
/// A key is left out when its list is empty.
pub fn filter_plist(filter: &Filter) -> String {
  let mut out = String::from("Filter = {\n");
  for (key, values) in [("Bundles", &filter.bundles), ("Executables", &filter.executables)] {
    if values.is_empty() {
      continue;
    }
    let quoted: Vec<String> = values.iter().map(|v| format!("\"{}\"", v)).collect();
    out.push_str(&format!("    {} = ( {} );\n", key, quoted.join(", ")));
  }
  out.push_str("};");
  out
}

/// Name of the filter descriptor written next to `install_name`.
fn plist_name(install_name: &str) -> String {
  let stem = Path::new(install_name)
    .file_stem()
    .map(|s| s.to_string_lossy().into_owned())
    .unwrap_or_else(|| install_name.to_string());
  format!("{}.plist", stem)
}

/// Copy a module's artifact and auxiliary files to its install location.
pub fn stage_module(
  spec: &ModuleSpec,
  layout: &StagingLayout,
  session: &BuildSession,
  artifact: &Path,
) -> Result<PathBuf, BuildError> {
  session.report(BuildEvent::Staging {
    module: spec.name.clone(),
  });

  if spec.custom_install_dir && layout.is_rootless() {
    session.report(BuildEvent::Caution {
      module: Some(spec.name.clone()),
      message: format!(
        "custom install directory {} is placed under /{}",
        spec.install_dir.display(),
        ROOTLESS_PREFIX
      ),
    });
  }

  let dest = layout.destination(spec);
  fs::create_dir_all(&dest).map_err(BuildError::io(&dest))?;

  let target = dest.join(&spec.install_name);
  fs::copy(artifact, &target).map_err(BuildError::io(artifact))?;

  if spec.kind.requires_resources() {
    if !spec.resources_dir.is_dir() {
      return Err(BuildError::Io {
        module: None,
        path: spec.resources_dir.clone(),
        source: std::io::Error::new(std::io::ErrorKind::NotFound, "resources directory does not exist"),
      });
    }
    copy_tree(&spec.resources_dir, &dest, &[]).map_err(BuildError::io(&spec.resources_dir))?;
  }

  if spec.kind == ModuleKind::Framework && !spec.public_headers.is_empty() {
    let headers = dest.join("Headers");
    fs::create_dir_all(&headers).map_err(BuildError::io(&headers))?;
    for header in &spec.public_headers {
      let Some(name) = header.file_name() else { continue };
      fs::copy(header, headers.join(name)).map_err(BuildError::io(header))?;
    }
  }

  if spec.kind.emits_filter() {
    let plist = dest.join(plist_name(&spec.install_name));
    fs::write(&plist, filter_plist(&spec.filter)).map_err(BuildError::io(&plist))?;
  }

  debug!(module = %spec.name, dest = %dest.display(), "staged");
  Ok(dest)
}
