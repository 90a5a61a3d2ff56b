//! Session-wide build configuration.
//!
//! Meta values are resolved through [`Layers`]: command-line overrides, then
//! the project's own `[meta]` table, then (for inheriting submodules) the
//! parent's effective meta, then built-in defaults. Empty strings and empty
//! arrays count as unset so a nested project only inherits what it leaves
//! blank.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use toml::{Table, Value};
use tracing::debug;

use super::error::ConfigError;
use super::layers::Layers;
use crate::platform::paths::storage_dir;
use crate::platform::{is_linux_host, tools};

/// Raw, typed view of a merged meta table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetaConfig {
  pub archs: Vec<String>,
  pub platform: String,
  pub min_version: String,
  pub sdk: String,
  pub prefix: String,
  pub cc: String,
  pub swift: String,
  pub lipo: String,
  pub strip: String,
  pub ldid: String,
  pub install_name_tool: String,
  pub libtool: String,
  pub dpkg_deb: String,
  pub git: String,
  pub preprocessor: String,
  pub debug: bool,
  pub release: bool,
  pub rootless: bool,
  pub compression: String,
  pub pack: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub jobs: Option<usize>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub tool_timeout: Option<String>,
}

impl Default for MetaConfig {
  fn default() -> Self {
    Self {
      archs: vec!["arm64".to_string(), "arm64e".to_string()],
      platform: "iphoneos".to_string(),
      min_version: "15.0".to_string(),
      sdk: String::new(),
      prefix: String::new(),
      cc: "clang".to_string(),
      swift: "swift".to_string(),
      lipo: "lipo".to_string(),
      strip: "strip".to_string(),
      ldid: "ldid".to_string(),
      install_name_tool: "install_name_tool".to_string(),
      libtool: "libtool".to_string(),
      dpkg_deb: "dpkg-deb".to_string(),
      git: "git".to_string(),
      preprocessor: String::new(),
      debug: true,
      release: false,
      rootless: true,
      compression: "xz".to_string(),
      pack: true,
      jobs: None,
      tool_timeout: None,
    }
  }
}

/// Compression used when packing the staged tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
  Xz,
  Gzip,
  Zstd,
  None,
}

impl Compression {
  pub fn parse(value: &str) -> Result<Self, ConfigError> {
    match value.to_lowercase().as_str() {
      "xz" => Ok(Self::Xz),
      "gzip" | "gz" => Ok(Self::Gzip),
      "zstd" | "zst" => Ok(Self::Zstd),
      "none" => Ok(Self::None),
      _ => Err(ConfigError::InvalidCompression(value.to_string())),
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Xz => "xz",
      Self::Gzip => "gzip",
      Self::Zstd => "zstd",
      Self::None => "none",
    }
  }
}

/// Names (or paths) of the external tools, as configured.
///
/// Discovery happens when a toolchain is built from them, so a project can
/// be loaded and inspected on a host without the native toolchain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolNames {
  pub cc: String,
  pub swift: String,
  pub lipo: String,
  pub strip: String,
  pub ldid: String,
  pub install_name_tool: String,
  pub libtool: String,
  pub dpkg_deb: String,
  pub git: String,
}

/// Resolved build configuration, immutable for the lifetime of a build.
#[derive(Debug, Clone)]
pub struct BuildMeta {
  pub archs: Vec<String>,
  pub platform: String,
  pub min_version: String,
  pub sdk: PathBuf,
  pub prefix: Option<PathBuf>,
  pub tools: ToolNames,
  /// Explicit preprocessor; `None` means the vendored one.
  pub preprocessor: Option<PathBuf>,
  pub debug: bool,
  pub rootless: bool,
  pub compression: Compression,
  pub pack: bool,
  pub jobs: Option<usize>,
  pub tool_timeout: Option<Duration>,
  pub storage: PathBuf,
  /// Effective meta table, handed to inheriting submodules.
  table: Table,
}

impl BuildMeta {
  /// Resolve meta from its layers.
  ///
  /// `overrides` come from the command line, `declared` from the project's
  /// `[meta]` table and `inherited` from the parent project when the
  /// submodule inherits.
  pub fn resolve(overrides: &Table, declared: Option<&Table>, inherited: Option<&Table>) -> Result<Self, ConfigError> {
    let layers = Layers::new()
      .with(overrides)
      .with_opt(declared)
      .with_opt(inherited)
      .skip_empty();

    let table = layers.merged();
    let config: MetaConfig = Value::Table(table.clone())
      .try_into()
      .map_err(|e| ConfigError::InvalidValue {
        key: "meta".to_string(),
        message: e.to_string(),
      })?;

    Self::from_config(config, table)
  }

  fn from_config(config: MetaConfig, table: Table) -> Result<Self, ConfigError> {
    if config.archs.is_empty() {
      return Err(ConfigError::InvalidValue {
        key: "archs".to_string(),
        message: "at least one architecture is required".to_string(),
      });
    }

    let storage = storage_dir();
    let compression = Compression::parse(&config.compression)?;
    let debug = config.debug && !config.release;
    let rootless = config.rootless && config.platform == "iphoneos";

    let tool_timeout = config
      .tool_timeout
      .as_deref()
      .map(|raw| {
        humantime::parse_duration(raw).map_err(|e| ConfigError::InvalidValue {
          key: "tool_timeout".to_string(),
          message: e.to_string(),
        })
      })
      .transpose()?;

    if config.jobs == Some(0) {
      return Err(ConfigError::InvalidValue {
        key: "jobs".to_string(),
        message: "must be at least 1".to_string(),
      });
    }

    let prefix = resolve_prefix(&config.prefix, &storage)?;
    let sdk = resolve_sdk(&config.sdk, &config.platform, &config.min_version, &storage)?;
    let preprocessor = (!config.preprocessor.is_empty()).then(|| PathBuf::from(&config.preprocessor));

    Ok(Self {
      archs: config.archs,
      platform: config.platform,
      min_version: config.min_version,
      sdk,
      prefix,
      tools: ToolNames {
        cc: config.cc,
        swift: config.swift,
        lipo: config.lipo,
        strip: config.strip,
        ldid: config.ldid,
        install_name_tool: config.install_name_tool,
        libtool: config.libtool,
        dpkg_deb: config.dpkg_deb,
        git: config.git,
      },
      preprocessor,
      debug,
      rootless,
      compression,
      pack: config.pack,
      jobs: config.jobs,
      tool_timeout,
      storage,
      table,
    })
  }

  pub fn release(&self) -> bool {
    !self.debug
  }

  /// The table an inheriting submodule layers beneath its own `[meta]`.
  pub fn effective_table(&self) -> &Table {
    &self.table
  }

  /// Install-time root under the root-prefix policy (`/var/jb`), or empty.
  pub fn install_root(&self) -> &'static str {
    if self.rootless { "/var/jb" } else { "" }
  }

  /// `-m<platform>-version-min=<version>`
  pub fn version_min_flag(&self) -> String {
    format!("-m{}-version-min={}", self.platform, self.min_version)
  }

  /// Target triple handed to the second-language compiler.
  pub fn swift_target(&self, arch: &str) -> String {
    let platform = if self.platform == "iphoneos" { "ios" } else { self.platform.as_str() };
    format!("{}-apple-{}{}", arch, platform, self.min_version)
  }
}

/// Parse one `--meta key=value` override.
///
/// Values are typed: booleans, all-digit integers, bracketed arrays (elements
/// typed the same way, quotes stripped) and plain strings.
pub fn parse_override(raw: &str) -> Result<(String, Value), ConfigError> {
  let (key, value) = raw
    .split_once('=')
    .ok_or_else(|| ConfigError::InvalidOverride(raw.to_string()))?;
  let key = key.trim();
  if key.is_empty() {
    return Err(ConfigError::InvalidOverride(raw.to_string()));
  }
  Ok((key.to_string(), typed_value(value.trim())))
}

/// Collect overrides into a table, later entries replacing earlier ones.
pub fn overrides_table<S: AsRef<str>>(raw: &[S]) -> Result<Table, ConfigError> {
  let mut table = Table::new();
  for entry in raw {
    let (key, value) = parse_override(entry.as_ref())?;
    table.insert(key, value);
  }
  Ok(table)
}

fn typed_value(raw: &str) -> Value {
  let lower = raw.to_lowercase();
  if lower == "true" || lower == "false" {
    return Value::Boolean(lower == "true");
  }
  if !raw.is_empty()
    && raw.chars().all(|c| c.is_ascii_digit())
    && let Ok(n) = raw.parse::<i64>()
  {
    return Value::Integer(n);
  }
  if let Some(inner) = raw.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
    if inner.trim().is_empty() {
      return Value::Array(Vec::new());
    }
    return Value::Array(
      inner
        .split(',')
        .map(|item| typed_value(item.trim().trim_matches(|c| c == '"' || c == '\'')))
        .collect(),
    );
  }
  Value::String(raw.to_string())
}

fn resolve_prefix(prefix: &str, storage: &Path) -> Result<Option<PathBuf>, ConfigError> {
  if prefix.is_empty() {
    let bundled = storage.join("toolchain").join("linux").join("iphone").join("bin");
    if is_linux_host() && bundled.exists() {
      return Ok(Some(bundled));
    }
    return Ok(None);
  }

  let path = PathBuf::from(prefix);
  if !path.exists() {
    return Err(ConfigError::InvalidValue {
      key: "prefix".to_string(),
      message: format!("{} does not exist", path.display()),
    });
  }
  Ok(Some(path))
}

fn resolve_sdk(sdk: &str, platform: &str, min_version: &str, storage: &Path) -> Result<PathBuf, ConfigError> {
  if !sdk.is_empty() {
    let direct = PathBuf::from(sdk);
    if direct.exists() {
      return Ok(direct);
    }
    let stored = storage.join("sdks").join(sdk);
    if stored.exists() {
      return Ok(stored);
    }
    return Err(ConfigError::SdkNotFound {
      platform: platform.to_string(),
      detail: format!("{} does not exist", direct.display()),
    });
  }

  if let Some(found) = closest_stored_sdk(&storage.join("sdks"), platform, min_version) {
    debug!(sdk = %found.display(), "using stored sdk");
    return Ok(found);
  }

  xcrun_sdk(platform)
}

/// Pick the stored SDK for `platform` whose version is closest to `min_version`.
fn closest_stored_sdk(dir: &Path, platform: &str, min_version: &str) -> Option<PathBuf> {
  let target: f64 = min_version.parse().ok()?;
  let platform = platform.to_lowercase();

  std::fs::read_dir(dir)
    .ok()?
    .filter_map(|entry| entry.ok())
    .filter_map(|entry| {
      let name = entry.file_name().to_string_lossy().to_lowercase();
      if !name.contains(&platform) {
        return None;
      }
      let version: f64 = name.replace(&platform, "").replace(".sdk", "").parse().ok()?;
      Some((entry.path(), (version - target).abs()))
    })
    .min_by(|a, b| a.1.total_cmp(&b.1))
    .map(|(path, _)| path)
}

fn xcrun_sdk(platform: &str) -> Result<PathBuf, ConfigError> {
  let not_found = |detail: String| ConfigError::SdkNotFound {
    platform: platform.to_string(),
    detail,
  };

  let xcrun = tools::find_in_path("xcrun").ok_or_else(|| not_found("no stored SDK and xcrun is unavailable".into()))?;
  let output = Command::new(xcrun)
    .args(["--show-sdk-path", "--sdk", platform])
    .output()
    .map_err(|e| not_found(e.to_string()))?;

  let stdout = String::from_utf8_lossy(&output.stdout);
  match stdout.lines().last().map(str::trim) {
    Some(line) if line.starts_with('/') => Ok(PathBuf::from(line)),
    _ => Err(not_found("xcrun did not report an SDK path".into())),
  }
}
