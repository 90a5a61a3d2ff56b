//! Static checks over a project declaration, without building anything.

use std::path::Path;

use toml::{Table, Value};

use super::loader::{ProjectConfig, read_project_file};
use super::meta::{BuildMeta, MetaConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
  Note,
  Warning,
  Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
  pub severity: Severity,
  pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct VerifyReport {
  pub findings: Vec<Finding>,
}

impl VerifyReport {
  fn push(&mut self, severity: Severity, message: impl Into<String>) {
    self.findings.push(Finding {
      severity,
      message: message.into(),
    });
  }

  pub fn count(&self, severity: Severity) -> usize {
    self.findings.iter().filter(|f| f.severity == severity).count()
  }

  pub fn warnings(&self) -> usize {
    self.count(Severity::Warning)
  }

  pub fn errors(&self) -> usize {
    self.count(Severity::Error)
  }

  pub fn is_ok(&self) -> bool {
    self.errors() == 0
  }
}

/// Load the project at `root` and report problems a build would hit.
pub fn verify(root: &Path) -> VerifyReport {
  let mut report = VerifyReport::default();

  let project = match ProjectConfig::load(root) {
    Ok(project) => project,
    Err(e) => {
      report.push(Severity::Error, format!("failed to load project: {}", e));
      return report;
    }
  };

  for script in project.scripts.iter().filter(|s| !s.is_known()) {
    report.push(
      Severity::Warning,
      format!(
        "script type `{}` is unknown, expected one of preinst, postinst, prerm, postrm",
        script.kind
      ),
    );
  }

  match &project.meta_table {
    None => report.push(Severity::Note, "no [meta] table, built-in defaults are used"),
    Some(table) => {
      for key in redundant_meta_keys(table) {
        report.push(Severity::Note, format!("meta `{}` is set to its default value", key));
      }
      if let Err(e) = BuildMeta::resolve(&Table::new(), Some(table), None) {
        report.push(Severity::Error, format!("invalid meta: {}", e));
      }
    }
  }

  if project.control.is_none() {
    report.push(Severity::Warning, "no control found, packing is disabled");
  }

  // Keys nobody reads are most likely typos.
  if let Ok(file) = read_project_file(&project.root)
    && let Some(meta) = &file.meta
  {
    let known = default_meta_table();
    for key in meta
      .keys()
      .filter(|k| !known.contains_key(*k) && !OPTIONAL_META_KEYS.contains(&k.as_str()))
    {
      report.push(Severity::Warning, format!("unknown meta key `{}`", key));
    }
  }

  report
}

const OPTIONAL_META_KEYS: &[&str] = &["jobs", "tool_timeout"];

fn default_meta_table() -> Table {
  match Value::try_from(MetaConfig::default()) {
    Ok(Value::Table(table)) => table,
    _ => Table::new(),
  }
}

fn redundant_meta_keys(declared: &Table) -> Vec<String> {
  let defaults = default_meta_table();
  declared
    .iter()
    .filter(|(key, value)| defaults.get(*key) == Some(*value))
    .map(|(key, _)| key.clone())
    .collect()
}
