//! Package metadata and maintainer scripts.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::error::ConfigError;
use super::module::resolve_against;
use crate::consts::MAINTAINER_SCRIPTS;

/// Debian-style package metadata from `[control]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Control {
  pub id: String,
  pub name: Option<String>,
  pub version: String,
  pub architecture: String,
  pub description: Option<String>,
  pub maintainer: String,
  pub author: Option<String>,
  pub section: Option<String>,
  pub priority: Option<String>,
  pub homepage: Option<String>,
  pub essential: bool,
  pub depends: Vec<String>,
  pub pre_depends: Vec<String>,
  pub conflicts: Vec<String>,
  pub replaces: Vec<String>,
  pub provides: Vec<String>,
  pub recommends: Vec<String>,
  pub suggests: Vec<String>,
  pub breaks: Vec<String>,
  pub enhances: Vec<String>,
}

impl Control {
  /// Check the fields every package must carry.
  pub fn validate(&self) -> Result<(), ConfigError> {
    let required = [
      ("id", &self.id),
      ("version", &self.version),
      ("maintainer", &self.maintainer),
      ("architecture", &self.architecture),
    ];
    match required.iter().find(|(_, value)| value.trim().is_empty()) {
      Some(&(field, _)) => Err(ConfigError::MissingControlField(field)),
      None => Ok(()),
    }
  }

  /// Parse a hand-written control file (`Key: value` lines).
  pub fn parse(text: &str) -> Result<Self, ConfigError> {
    let mut control = Control::default();
    for line in text.lines() {
      let Some((key, value)) = line.split_once(':') else {
        continue;
      };
      let value = value.trim().to_string();
      let list = || value.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect();
      match key.trim().to_lowercase().as_str() {
        "package" => control.id = value,
        "name" => control.name = Some(value),
        "version" => control.version = value,
        "architecture" => control.architecture = value,
        "description" => control.description = Some(value),
        "maintainer" => control.maintainer = value,
        "author" => control.author = Some(value),
        "section" => control.section = Some(value),
        "priority" => control.priority = Some(value),
        "homepage" => control.homepage = Some(value),
        "essential" => control.essential = value.eq_ignore_ascii_case("yes"),
        "depends" => control.depends = list(),
        "pre-depends" => control.pre_depends = list(),
        "conflicts" => control.conflicts = list(),
        "replaces" => control.replaces = list(),
        "provides" => control.provides = list(),
        "recommends" => control.recommends = list(),
        "suggests" => control.suggests = list(),
        "breaks" => control.breaks = list(),
        "enhances" => control.enhances = list(),
        _ => {}
      }
    }
    control.validate()?;
    Ok(control)
  }

  /// Version string for a debug build: `<version>-<build_number>+debug`.
  pub fn debug_version(&self, build_number: u64) -> String {
    format!("{}-{}+debug", self.version, build_number)
  }

  /// Render as a Debian control file.
  pub fn render(&self) -> String {
    let mut out = String::new();
    let mut field = |key: &str, value: &str| {
      if !value.is_empty() {
        out.push_str(&format!("{}: {}\n", key, value));
      }
    };

    field("Package", &self.id);
    field("Name", self.name.as_deref().unwrap_or_default());
    field("Version", &self.version);
    field("Architecture", &self.architecture);
    field("Description", self.description.as_deref().unwrap_or_default());
    field("Maintainer", &self.maintainer);
    field("Author", self.author.as_deref().unwrap_or(&self.maintainer));
    field("Section", self.section.as_deref().unwrap_or_default());
    field("Priority", self.priority.as_deref().unwrap_or_default());
    field("Homepage", self.homepage.as_deref().unwrap_or_default());
    if self.essential {
      field("Essential", "yes");
    }
    for (key, list) in [
      ("Depends", &self.depends),
      ("Pre-Depends", &self.pre_depends),
      ("Conflicts", &self.conflicts),
      ("Replaces", &self.replaces),
      ("Provides", &self.provides),
      ("Recommends", &self.recommends),
      ("Suggests", &self.suggests),
      ("Breaks", &self.breaks),
      ("Enhances", &self.enhances),
    ] {
      field(key, &list.join(", "));
    }
    out
  }
}

/// A `[[scripts]]` entry as declared.
#[derive(Debug, Clone, Deserialize)]
pub struct ScriptDecl {
  #[serde(rename = "type")]
  pub kind: String,
  pub path: Option<String>,
  pub content: Option<String>,
}

/// A maintainer script with its content loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaintainerScript {
  pub kind: String,
  pub content: String,
}

impl MaintainerScript {
  pub fn resolve(decl: &ScriptDecl, root: &Path) -> Result<Self, ConfigError> {
    let script_err = |message: String| ConfigError::Script {
      kind: decl.kind.clone(),
      message,
    };

    let content = match (&decl.path, &decl.content) {
      (Some(path), _) => {
        let path = resolve_against(root, path);
        std::fs::read_to_string(&path).map_err(|e| script_err(format!("{}: {}", path.display(), e)))?
      }
      (None, Some(content)) => content.clone(),
      (None, None) => return Err(script_err("either path or content must be set".to_string())),
    };

    Ok(Self {
      kind: decl.kind.clone(),
      content,
    })
  }

  /// Whether dpkg knows this script type.
  pub fn is_known(&self) -> bool {
    MAINTAINER_SCRIPTS.contains(&self.kind.as_str())
  }
}
