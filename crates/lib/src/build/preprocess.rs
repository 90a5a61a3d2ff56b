//! Macro preprocessing of hook sources.
//!
//! Sources with a preprocessed extension are expanded by the external
//! preprocessor into `<scratch>/logos-processed/<module>/<basename>.<ext>`
//! and the expanded file is compiled in their place. Everything else passes
//! through untouched.

use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::debug;

use super::types::{BuildError, ToolContext};
use crate::config::module::is_preprocessed;
use crate::consts::PREPROCESSED_EXTENSIONS;
use crate::flags::{Flag, FlagSet};
use crate::toolchain::{ToolError, Toolchain};

/// A source as handed to the compile stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceUnit {
  Expanded { original: PathBuf, expanded: PathBuf },
  PassThrough(PathBuf),
}

impl SourceUnit {
  /// The declared source path. Object names and hash records key on this.
  pub fn original(&self) -> &Path {
    match self {
      SourceUnit::Expanded { original, .. } => original,
      SourceUnit::PassThrough(path) => path,
    }
  }

  /// The path the compiler reads.
  pub fn compile_path(&self) -> &Path {
    match self {
      SourceUnit::Expanded { expanded, .. } => expanded,
      SourceUnit::PassThrough(path) => path,
    }
  }
}

/// Where the expansion of `file` is written, or `None` for sources that are
/// not preprocessed.
pub fn expanded_path(processed_dir: &Path, file: &Path) -> Option<PathBuf> {
  let ext = file.extension()?.to_str()?;
  let (_, target) = PREPROCESSED_EXTENSIONS.iter().find(|(src, _)| *src == ext)?;
  let name = file.file_name()?.to_string_lossy();
  Some(processed_dir.join(format!("{}.{}", name, target)))
}

/// Preprocess one file for `module`.
pub fn preprocess(
  toolchain: &dyn Toolchain,
  module: &str,
  processed_dir: &Path,
  file: &Path,
) -> Result<SourceUnit, BuildError> {
  let Some(expanded) = expanded_path(processed_dir, file) else {
    return Ok(SourceUnit::PassThrough(file.to_path_buf()));
  };
  let context = || ToolContext::module(module).file(file);

  let output = toolchain.preprocess(file).map_err(context().wrap())?;

  // The expander prints its diagnostics instead of code on failure.
  let first = output.lines().next().unwrap_or_default();
  if !first.starts_with('#') {
    let message = if first.is_empty() { "no output".to_string() } else { first.to_string() };
    return Err(context().wrap()(ToolError::BadOutput {
      tool: "preprocessor".to_string(),
      message,
    }));
  }

  fs::create_dir_all(processed_dir).map_err(BuildError::io(processed_dir))?;
  fs::write(&expanded, &output).map_err(BuildError::io(&expanded))?;
  debug!(module, file = %file.display(), expanded = %expanded.display(), "preprocessed");

  Ok(SourceUnit::Expanded {
    original: file.to_path_buf(),
    expanded,
  })
}

/// Prepare every file in `files` on the current pool.
///
/// All files are attempted; the first failure in declaration order is returned.
pub fn preprocess_all(
  toolchain: &dyn Toolchain,
  module: &str,
  processed_dir: &Path,
  files: &[PathBuf],
) -> Result<Vec<SourceUnit>, BuildError> {
  let results: Vec<Result<SourceUnit, BuildError>> = files
    .par_iter()
    .map(|file| {
      if is_preprocessed(file) {
        preprocess(toolchain, module, processed_dir, file)
      } else {
        Ok(SourceUnit::PassThrough(file.clone()))
      }
    })
    .collect();
  results.into_iter().collect()
}

/// Include directories contributed by expanded sources: each original file's
/// directory, once.
pub fn include_flags(units: &[SourceUnit]) -> FlagSet {
  units
    .iter()
    .filter_map(|unit| match unit {
      SourceUnit::Expanded { original, .. } => original.parent().map(|dir| Flag::Include(dir.to_path_buf())),
      SourceUnit::PassThrough(_) => None,
    })
    .collect()
}
