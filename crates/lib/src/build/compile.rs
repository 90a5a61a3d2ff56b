//! Per-architecture compilation.
//!
//! Every (file, architecture) pair is an independent job on the session
//! pool. The stage returns only after every job has finished, which is the
//! barrier linking waits on.

use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::{debug, trace};

use super::module::ModuleContext;
use super::preprocess::{SourceUnit, include_flags};
use super::types::{BuildError, CompiledArtifact, ToolContext};
use crate::config::module::is_swift;
use crate::flags::{Flag, FlagSet};
use crate::session::BuildEvent;
use crate::toolchain::{CompileJob, Language};
use crate::util::fs::{outputs_of, remove_if_exists};

/// Object path for `source` on `arch` in this session.
pub fn object_path(obj_dir: &Path, arch: &str, source: &Path, nonce: &str) -> PathBuf {
  let basename = source.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
  obj_dir.join(arch).join(format!("{}-{}.o", basename, nonce))
}

/// Header search directories shared by both languages.
fn search_dirs(ctx: &ModuleContext<'_>, units: &[SourceUnit]) -> FlagSet {
  let mut flags: FlagSet = ctx.spec.include_dirs.iter().map(|d| Flag::Include(d.clone())).collect();
  flags.extend(include_flags(units));
  flags.insert(Flag::Include(ctx.vendor.headers.clone()));
  flags
}

/// Arguments for a C-family compile of one architecture.
pub fn c_args(ctx: &ModuleContext<'_>, includes: &FlagSet, arch: &str) -> Vec<String> {
  let spec = ctx.spec;
  let mut args = Vec::new();
  if spec.use_arc {
    args.push("-fobjc-arc".to_string());
  }
  args.push("-isysroot".to_string());
  args.push(ctx.meta.sdk.display().to_string());
  args.push(format!("-O{}", spec.optimization));
  args.push("-arch".to_string());
  args.push(arch.to_string());
  args.extend(includes.to_args());
  args.push(ctx.meta.version_min_flag());
  if ctx.meta.debug {
    args.push("-g".to_string());
  }
  if let Some(version) = ctx.package_version {
    args.extend(FlagSet::new().with(Flag::define("LUZ_PACKAGE_VERSION", format!("\"{}\"", version))).to_args());
  }
  args.push("-c".to_string());
  args.extend(spec.c_flags.iter().cloned());
  args.extend(spec.warnings.iter().cloned());
  args
}

/// Arguments for a Swift frontend compile of one architecture.
pub fn swift_args(ctx: &ModuleContext<'_>, includes: &FlagSet, arch: &str, object: &Path) -> Vec<String> {
  let spec = ctx.spec;
  let mut args = vec![
    "-module-name".to_string(),
    spec.name.clone(),
    "-sdk".to_string(),
    ctx.meta.sdk.display().to_string(),
  ];
  args.extend(includes.to_args());
  if let Some(header) = spec.bridging_headers.first() {
    args.push("-import-objc-header".to_string());
    args.push(header.display().to_string());
  }
  args.push("-target".to_string());
  args.push(ctx.meta.swift_target(arch));
  args.push("-emit-module-path".to_string());
  args.push(object.with_extension("swiftmodule").display().to_string());
  if ctx.meta.debug {
    args.push("-g".to_string());
  }
  args.extend(spec.swift_flags.iter().cloned());
  args
}

/// Compile `units` for every architecture.
///
/// Jobs that already started are never cancelled: every pair runs to
/// completion and the first failure in (file, architecture) declaration
/// order is returned.
pub fn compile_module(ctx: &ModuleContext<'_>, units: &[SourceUnit]) -> Result<Vec<CompiledArtifact>, BuildError> {
  let spec = ctx.spec;
  let obj_dir = ctx.session.obj_dir(&spec.name);
  for arch in &ctx.meta.archs {
    let dir = obj_dir.join(arch);
    fs::create_dir_all(&dir).map_err(BuildError::io(&dir))?;
  }

  let includes = search_dirs(ctx, units);
  let swift_sources: Vec<PathBuf> = spec.files.iter().filter(|f| is_swift(f)).cloned().collect();

  for unit in units {
    ctx.session.report(BuildEvent::Compiling {
      module: spec.name.clone(),
      file: unit.original().to_path_buf(),
    });
  }

  let jobs: Vec<(&SourceUnit, &str)> = units
    .iter()
    .flat_map(|unit| ctx.meta.archs.iter().map(move |arch| (unit, arch.as_str())))
    .collect();

  let results: Vec<Result<CompiledArtifact, BuildError>> = ctx.session.pool().install(|| {
    jobs
      .par_iter()
      .map(|(unit, arch)| compile_one(ctx, unit, arch, &includes, &swift_sources, &obj_dir))
      .collect()
  });

  let mut artifacts = Vec::with_capacity(results.len());
  let mut first_error = None;
  for result in results {
    match result {
      Ok(artifact) => artifacts.push(artifact),
      Err(e) => {
        debug!(module = %spec.name, error = %e, "compile job failed");
        first_error.get_or_insert(e);
      }
    }
  }
  match first_error {
    Some(e) => Err(e),
    None => Ok(artifacts),
  }
}

fn compile_one(
  ctx: &ModuleContext<'_>,
  unit: &SourceUnit,
  arch: &str,
  includes: &FlagSet,
  swift_sources: &[PathBuf],
  obj_dir: &Path,
) -> Result<CompiledArtifact, BuildError> {
  let original = unit.original();
  let arch_dir = obj_dir.join(arch);

  let basename = original.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
  for stale in outputs_of(&arch_dir, &basename) {
    trace!(path = %stale.display(), "removing stale output");
    remove_if_exists(&stale).map_err(BuildError::io(&stale))?;
  }

  let object = object_path(obj_dir, arch, original, ctx.session.nonce());
  let (language, args, siblings) = if is_swift(original) {
    let siblings: Vec<PathBuf> = swift_sources.iter().filter(|f| f.as_path() != original).cloned().collect();
    (Language::Swift, swift_args(ctx, includes, arch, &object), siblings)
  } else {
    (Language::CFamily, c_args(ctx, includes, arch), Vec::new())
  };

  let job = CompileJob {
    language,
    source: unit.compile_path(),
    siblings: &siblings,
    arch,
    output: &object,
    args: &args,
  };
  ctx
    .toolchain
    .compile(&job)
    .map_err(ToolContext::module(&ctx.spec.name).file(original).arch(arch).wrap())?;

  debug!(module = %ctx.spec.name, file = %original.display(), arch, "compiled");
  Ok(CompiledArtifact {
    source: original.to_path_buf(),
    arch: arch.to_string(),
    object,
  })
}
