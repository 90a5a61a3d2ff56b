//! Implementation of the `luz build` command.
//!
//! Builds the project tree at the given path and packs it when the project
//! declares a control.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use luz_lib::config::meta::overrides_table;
use luz_lib::project::{BuildOptions, build};

use crate::output::{ConsoleReporter, format_duration, print_stat, print_success};

pub fn cmd_build(path: &Path, clean: bool, meta: &[String]) -> Result<()> {
  let overrides = overrides_table(meta).context("Invalid --meta value")?;
  let options = BuildOptions {
    clean,
    overrides,
    reporter: Arc::new(ConsoleReporter),
    ..Default::default()
  };

  let summary = build(path, &options).with_context(|| format!("Build failed in {}", path.display()))?;

  let compiled: usize = summary.modules.iter().map(|m| m.compiled.len()).sum();
  info!(modules = summary.modules.len(), compiled, "build finished");

  println!();
  print_success(&format!(
    "Built {} module(s) in {}",
    summary.modules.len(),
    format_duration(summary.elapsed)
  ));
  print_stat("Compiled", &compiled.to_string());
  if let Some(package) = &summary.package {
    print_stat("Package", &package.display().to_string());
  }

  Ok(())
}
