//! Module declarations.
//!
//! A `[[modules]]` entry resolves into a [`ModuleSpec`]. Every field goes
//! through the same [`Layers`] stack: the module's own table, then
//! `[defaults.<kind>]`, then the built-in defaults of its kind, then
//! `[defaults]`, then the built-in global defaults.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use toml::{Table, Value};

use super::error::ConfigError;
use super::layers::{Layers, string_array, table_of};
use crate::consts::{PREPROCESSED_EXTENSIONS, SWIFT_EXTENSION};

/// What a module builds, and therefore where and how it installs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModuleKind {
  Executable,
  InjectedLibrary,
  SharedLibrary,
  PreferenceBundle,
  Framework,
  StaticLibrary,
}

/// Shape of the linker's output for a kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOutput {
  Executable,
  DynamicLibrary,
  StaticArchive,
}

impl FromStr for ModuleKind {
  type Err = ConfigError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_lowercase().as_str() {
      "tool" => Ok(Self::Executable),
      "tweak" => Ok(Self::InjectedLibrary),
      "library" | "lib" => Ok(Self::SharedLibrary),
      "preferences" | "prefs" => Ok(Self::PreferenceBundle),
      "framework" => Ok(Self::Framework),
      "static" => Ok(Self::StaticLibrary),
      _ => Err(ConfigError::UnknownKind(s.to_string())),
    }
  }
}

impl ModuleKind {
  /// Name of the `[defaults.<kind>]` table for this kind.
  pub fn config_key(self) -> &'static str {
    match self {
      Self::Executable => "tool",
      Self::InjectedLibrary => "tweak",
      Self::SharedLibrary => "library",
      Self::PreferenceBundle => "preferences",
      Self::Framework => "framework",
      Self::StaticLibrary => "static",
    }
  }

  /// Install directory relative to the package root.
  pub fn default_install_dir(self, name: &str) -> PathBuf {
    match self {
      Self::Executable => PathBuf::from("usr/local/bin"),
      Self::InjectedLibrary => PathBuf::from("Library/MobileSubstrate/DynamicLibraries"),
      Self::SharedLibrary | Self::StaticLibrary => PathBuf::from("usr/lib"),
      Self::PreferenceBundle => PathBuf::from(format!("Library/PreferenceBundles/{}.bundle", name)),
      Self::Framework => PathBuf::from(format!("Library/Frameworks/{}.framework", name)),
    }
  }

  pub fn default_install_name(self, name: &str) -> String {
    match self {
      Self::Executable | Self::Framework => name.to_string(),
      Self::StaticLibrary => format!("lib{}.a", name),
      Self::InjectedLibrary | Self::SharedLibrary | Self::PreferenceBundle => format!("{}.dylib", name),
    }
  }

  pub fn default_libraries(self) -> &'static [&'static str] {
    match self {
      Self::InjectedLibrary => &["substrate", "System"],
      Self::StaticLibrary => &[],
      _ => &["System"],
    }
  }

  pub fn default_frameworks(self) -> &'static [&'static str] {
    match self {
      Self::StaticLibrary => &[],
      _ => &["Foundation", "CoreFoundation"],
    }
  }

  pub fn default_private_frameworks(self) -> &'static [&'static str] {
    match self {
      Self::PreferenceBundle => &["Preferences"],
      _ => &[],
    }
  }

  /// Injected libraries ship a filter descriptor next to the dylib.
  pub fn emits_filter(self) -> bool {
    self == Self::InjectedLibrary
  }

  pub fn requires_resources(self) -> bool {
    matches!(self, Self::PreferenceBundle | Self::Framework)
  }

  pub fn link_output(self) -> LinkOutput {
    match self {
      Self::Executable => LinkOutput::Executable,
      Self::StaticLibrary => LinkOutput::StaticArchive,
      _ => LinkOutput::DynamicLibrary,
    }
  }

  /// Built-in defaults that only apply to this kind.
  fn builtin_defaults(self) -> Table {
    match self {
      Self::InjectedLibrary => {
        let filter = table_of([("bundles", string_array(&["com.apple.springboard"]))]);
        table_of([("filter", Value::Table(filter))])
      }
      _ => Table::new(),
    }
  }
}

impl std::fmt::Display for ModuleKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.config_key())
  }
}

/// Targets an injected library loads into.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Filter {
  pub bundles: Vec<String>,
  pub executables: Vec<String>,
}

fn builtin_global_defaults() -> Table {
  table_of([
    ("optimization", Value::Integer(0)),
    ("warnings", string_array(&["-Wall"])),
    ("codesign_flags", string_array(&["-S"])),
    ("use_arc", Value::Boolean(true)),
    ("only_compile_changed", Value::Boolean(true)),
  ])
}

/// One compilation unit, fully resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleSpec {
  pub name: String,
  pub kind: ModuleKind,
  /// Absolute source paths, in declaration order.
  pub files: Vec<PathBuf>,
  pub install_name: String,
  /// Install directory relative to the package root.
  pub install_dir: PathBuf,
  /// Whether `install_dir` came from the declaration rather than the kind.
  pub custom_install_dir: bool,
  pub c_flags: Vec<String>,
  pub swift_flags: Vec<String>,
  pub linker_flags: Vec<String>,
  pub optimization: u8,
  pub warnings: Vec<String>,
  pub codesign_flags: Vec<String>,
  pub filter: Filter,
  pub use_arc: bool,
  pub only_compile_changed: bool,
  pub bridging_headers: Vec<PathBuf>,
  pub public_headers: Vec<PathBuf>,
  pub include_dirs: Vec<PathBuf>,
  pub framework_dirs: Vec<PathBuf>,
  pub library_dirs: Vec<PathBuf>,
  pub frameworks: Vec<String>,
  pub private_frameworks: Vec<String>,
  pub libraries: Vec<String>,
  pub resources_dir: PathBuf,
}

impl ModuleSpec {
  /// Resolve one `[[modules]]` table declared by the project at `root`.
  pub fn from_table(table: &Table, defaults: &Table, root: &Path) -> Result<Self, ConfigError> {
    let name: String = Layers::new().with(table).require("name")?;
    let module_err = |message: String| ConfigError::Module {
      module: name.clone(),
      message,
    };

    let kind_raw: String = Layers::new().with(table).with(defaults).get_or("type", "tweak".to_string())?;
    let kind = ModuleKind::from_str(&kind_raw)?;

    let kind_defaults = match defaults.get(kind.config_key()) {
      Some(Value::Table(t)) => Some(t),
      _ => None,
    };
    let builtin_kind = kind.builtin_defaults();
    let builtin_global = builtin_global_defaults();
    let layers = Layers::new()
      .with(table)
      .with_opt(kind_defaults)
      .with(&builtin_kind)
      .with(defaults)
      .with(&builtin_global);

    let files = resolve_files(&name, &layers, root)?;

    let install_name = layers
      .get::<String>("install_name")?
      .filter(|n| !n.is_empty())
      .unwrap_or_else(|| kind.default_install_name(&name));

    let (install_dir, custom_install_dir) = match layers.get::<String>("install_dir")?.filter(|d| !d.is_empty()) {
      Some(dir) => (package_relative(&dir).map_err(module_err)?, true),
      None => (kind.default_install_dir(&name), false),
    };

    let list = |key: &str| -> Result<Vec<String>, ConfigError> { layers.get_or(key, Vec::new()) };
    let paths = |key: &str| -> Result<Vec<PathBuf>, ConfigError> {
      Ok(list(key)?.iter().map(|p| resolve_against(root, p)).collect())
    };

    let bridging_headers = paths("bridging_headers")?;
    if let Some(missing) = bridging_headers.iter().find(|p| !p.exists()) {
      return Err(ConfigError::MissingFile {
        module: name.clone(),
        path: missing.clone(),
      });
    }

    let mut frameworks = list("frameworks")?;
    extend_unique(&mut frameworks, kind.default_frameworks());
    let mut private_frameworks = list("private_frameworks")?;
    extend_unique(&mut private_frameworks, kind.default_private_frameworks());
    let mut libraries = list("libraries")?;
    extend_unique(&mut libraries, kind.default_libraries());

    let resources_dir = layers
      .get::<String>("resources_dir")?
      .filter(|d| !d.is_empty())
      .map(|d| resolve_against(root, &d))
      .unwrap_or_else(|| root.join("Resources"));

    Ok(Self {
      kind,
      files,
      install_name,
      install_dir,
      custom_install_dir,
      c_flags: list("c_flags")?,
      swift_flags: list("swift_flags")?,
      linker_flags: list("linker_flags")?,
      optimization: layers.get_or("optimization", 0)?,
      warnings: list("warnings")?,
      codesign_flags: list("codesign_flags")?,
      filter: layers.get_or("filter", Filter::default())?,
      use_arc: layers.get_or("use_arc", true)?,
      only_compile_changed: layers.get_or("only_compile_changed", true)?,
      bridging_headers,
      public_headers: paths("public_headers")?,
      include_dirs: paths("include_dirs")?,
      framework_dirs: paths("framework_dirs")?,
      library_dirs: paths("library_dirs")?,
      frameworks,
      private_frameworks,
      libraries,
      resources_dir,
      name,
    })
  }

  /// Whether any source goes through the macro preprocessor.
  pub fn uses_preprocessor(&self) -> bool {
    self.files.iter().any(|f| is_preprocessed(f))
  }

  pub fn uses_swift(&self) -> bool {
    self.files.iter().any(|f| is_swift(f))
  }

  /// Three-letter tag used in progress output.
  pub fn abbreviated_name(&self) -> String {
    abbreviate(&self.name)
  }
}

/// First three letters upper-cased, left-padded when the name is shorter.
pub fn abbreviate(name: &str) -> String {
  let upper: String = name.chars().take(3).collect::<String>().to_uppercase();
  format!("{:>3}", upper)
}

pub fn is_preprocessed(path: &Path) -> bool {
  path
    .extension()
    .and_then(|e| e.to_str())
    .is_some_and(|ext| PREPROCESSED_EXTENSIONS.iter().any(|(src, _)| *src == ext))
}

pub fn is_swift(path: &Path) -> bool {
  path.extension().and_then(|e| e.to_str()) == Some(SWIFT_EXTENSION)
}

fn resolve_files(name: &str, layers: &Layers<'_>, root: &Path) -> Result<Vec<PathBuf>, ConfigError> {
  let raw: Vec<String> = match layers.lookup("files") {
    Some(Value::String(single)) => vec![single.clone()],
    Some(_) => layers.require("files")?,
    None => Vec::new(),
  };

  if raw.is_empty() {
    return Err(ConfigError::Module {
      module: name.to_string(),
      message: "no files specified".to_string(),
    });
  }

  let mut seen = HashSet::new();
  let mut basenames = HashSet::new();
  let mut files = Vec::with_capacity(raw.len());
  for entry in &raw {
    let path = resolve_against(root, entry);
    if !path.is_file() {
      return Err(ConfigError::MissingFile {
        module: name.to_string(),
        path,
      });
    }
    if !seen.insert(path.clone()) {
      return Err(ConfigError::Module {
        module: name.to_string(),
        message: format!("duplicate file {}", path.display()),
      });
    }
    let basename = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    if !basenames.insert(basename) {
      return Err(ConfigError::Module {
        module: name.to_string(),
        message: format!("two files share the name of {}", path.display()),
      });
    }
    files.push(path);
  }
  Ok(files)
}

/// Resolve `value` against `root` unless it is absolute, dropping `.` components.
pub(crate) fn resolve_against(root: &Path, value: &str) -> PathBuf {
  let path = Path::new(value);
  let joined = if path.is_absolute() { path.to_path_buf() } else { root.join(path) };
  joined.components().filter(|c| *c != Component::CurDir).collect()
}

/// Turn a declared install dir into a path under the package root.
fn package_relative(dir: &str) -> Result<PathBuf, String> {
  let mut out = PathBuf::new();
  for component in Path::new(dir).components() {
    match component {
      Component::Normal(part) => out.push(part),
      Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
      Component::ParentDir => return Err(format!("install_dir `{}` escapes the package root", dir)),
    }
  }
  Ok(out)
}

fn extend_unique(list: &mut Vec<String>, extra: &[&str]) {
  for item in extra {
    if !list.iter().any(|existing| existing == item) {
      list.push(item.to_string());
    }
  }
}
