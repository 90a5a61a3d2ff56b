//! Loading `luz.toml`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use toml::Table;
use tracing::{debug, warn};

use super::control::{Control, MaintainerScript, ScriptDecl};
use super::error::ConfigError;
use super::module::{ModuleSpec, resolve_against};
use crate::consts::{LAYOUT_DIR, PROJECT_FILE};

/// `luz.toml` exactly as written.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProjectFile {
  pub meta: Option<Table>,
  pub control: Option<Control>,
  pub defaults: Table,
  pub modules: Vec<Table>,
  pub submodules: Vec<SubmoduleDecl>,
  pub scripts: Vec<ScriptDecl>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmoduleDecl {
  pub path: String,
  #[serde(default = "default_inherit")]
  pub inherit: bool,
}

fn default_inherit() -> bool {
  true
}

/// A nested project, resolved against its parent's root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submodule {
  pub path: PathBuf,
  /// Share the parent's meta, hash list and worker pool.
  pub inherit: bool,
}

impl Submodule {
  pub fn name(&self) -> String {
    self
      .path
      .file_name()
      .map(|n| n.to_string_lossy().into_owned())
      .unwrap_or_default()
  }
}

/// A project with its modules validated, before meta is resolved.
#[derive(Debug, Clone)]
pub struct ProjectConfig {
  pub root: PathBuf,
  pub meta_table: Option<Table>,
  pub control: Option<Control>,
  pub modules: Vec<ModuleSpec>,
  pub submodules: Vec<Submodule>,
  pub scripts: Vec<MaintainerScript>,
}

impl ProjectConfig {
  /// Load and validate the project rooted at `root`.
  pub fn load(root: &Path) -> Result<Self, ConfigError> {
    let root = dunce::canonicalize(root).map_err(|_| ConfigError::NotFound(root.join(PROJECT_FILE)))?;
    let file = read_project_file(&root)?;
    debug!(root = %root.display(), modules = file.modules.len(), "loaded project file");

    let mut names = HashSet::new();
    let mut modules = Vec::with_capacity(file.modules.len());
    for table in &file.modules {
      let spec = ModuleSpec::from_table(table, &file.defaults, &root)?;
      if !names.insert(spec.name.clone()) {
        return Err(ConfigError::DuplicateModule(spec.name));
      }
      modules.push(spec);
    }

    let submodules = file
      .submodules
      .iter()
      .map(|decl| {
        let path = resolve_against(&root, &decl.path);
        if !path.join(PROJECT_FILE).is_file() {
          return Err(ConfigError::MissingSubmodule(path));
        }
        Ok(Submodule {
          path,
          inherit: decl.inherit,
        })
      })
      .collect::<Result<Vec<_>, _>>()?;

    let scripts = file
      .scripts
      .iter()
      .map(|decl| MaintainerScript::resolve(decl, &root))
      .collect::<Result<Vec<_>, _>>()?;

    let control = match file.control {
      Some(control) => {
        control.validate()?;
        Some(control)
      }
      None => manual_control(&root)?,
    };

    Ok(Self {
      root,
      meta_table: file.meta,
      control,
      modules,
      submodules,
      scripts,
    })
  }

  pub fn name(&self) -> String {
    self
      .root
      .file_name()
      .map(|n| n.to_string_lossy().into_owned())
      .unwrap_or_default()
  }
}

/// Parse `luz.toml` under `root` without validating modules.
pub fn read_project_file(root: &Path) -> Result<ProjectFile, ConfigError> {
  let path = root.join(PROJECT_FILE);
  if !path.is_file() {
    return Err(ConfigError::NotFound(path));
  }
  let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
    path: path.clone(),
    source,
  })?;
  toml::from_str(&text).map_err(|e| ConfigError::Parse {
    path,
    message: e.to_string(),
  })
}

/// Fall back to a hand-written control file when `[control]` is absent.
fn manual_control(root: &Path) -> Result<Option<Control>, ConfigError> {
  let candidates = [root.join("control"), root.join(LAYOUT_DIR).join("DEBIAN").join("control")];
  let Some(path) = candidates.iter().find(|p| p.is_file()) else {
    return Ok(None);
  };

  warn!(path = %path.display(), "no [control] table, using control file");
  let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
    path: path.clone(),
    source,
  })?;
  Control::parse(&text).map(Some)
}
