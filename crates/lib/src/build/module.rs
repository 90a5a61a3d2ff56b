//! One module's build: hash, compile, link, stage.

use std::time::Instant;

use tracing::{debug, trace};

use super::changeset::{self, objects_present};
use super::compile::compile_module;
use super::link::link_module;
use super::preprocess::preprocess_all;
use super::stage::{StagingLayout, stage_module};
use super::types::{BuildError, ModuleReport, ModuleState};
use crate::config::{BuildMeta, ModuleSpec};
use crate::session::{BuildEvent, BuildSession};
use crate::toolchain::Toolchain;
use crate::vendor::VendorDirs;

/// Everything a module build reads. Nothing in here is mutated during the
/// build except through the session.
#[derive(Clone, Copy)]
pub struct ModuleContext<'a> {
  pub spec: &'a ModuleSpec,
  pub meta: &'a BuildMeta,
  pub session: &'a BuildSession,
  pub toolchain: &'a dyn Toolchain,
  pub vendor: &'a VendorDirs,
  /// Package version compiled into sources, when the project has a control.
  pub package_version: Option<&'a str>,
  /// Set when the project is being packed.
  pub staging: Option<&'a StagingLayout>,
}

fn advance(module: &str, state: &mut ModuleState, next: ModuleState) {
  trace!(module, from = %state, to = %next, "module state");
  *state = next;
}

/// Build one module, reporting its outcome through the session.
pub fn build_module(ctx: &ModuleContext<'_>) -> Result<ModuleReport, BuildError> {
  let started = Instant::now();
  let name = &ctx.spec.name;
  let mut state = ModuleState::Pending;

  let result = run(ctx, &mut state).map_err(|e| e.in_module(name));
  match &result {
    Ok(_) => ctx.session.report(BuildEvent::ModuleDone {
      module: name.clone(),
      elapsed: started.elapsed(),
    }),
    Err(e) => {
      debug!(module = %name, state = %state, "module failed");
      advance(name, &mut state, ModuleState::Failed);
      ctx.session.report(BuildEvent::ModuleFailed {
        module: name.clone(),
        error: e.to_string(),
      });
    }
  }
  result
}

fn run(ctx: &ModuleContext<'_>, state: &mut ModuleState) -> Result<ModuleReport, BuildError> {
  let spec = ctx.spec;
  let session = ctx.session;

  advance(&spec.name, state, ModuleState::Hashing);
  let prior = session.prior_hashes(&spec.files);
  let obj_dir = session.obj_dir(&spec.name);
  let changes = changeset::resolve(
    &spec.files,
    &prior,
    |file| objects_present(&obj_dir, &ctx.meta.archs, file),
    ctx.meta.archs.len(),
    spec.only_compile_changed,
  );
  debug!(module = %spec.name, to_compile = changes.to_compile.len(), files = spec.files.len(), "change set");

  advance(&spec.name, state, ModuleState::Compiling);
  let compiled = if changes.is_empty() {
    session.report(BuildEvent::NothingToCompile {
      module: spec.name.clone(),
    });
    Ok(Vec::new())
  } else {
    preprocess_all(
      ctx.toolchain,
      &spec.name,
      &session.processed_dir(&spec.name),
      &changes.to_compile,
    )
    .and_then(|units| compile_module(ctx, &units))
  };
  session.merge_hashes(&changes.updates_after(compiled.is_ok()));
  let objects = compiled?;

  advance(&spec.name, state, ModuleState::Linking);
  let linked = link_module(ctx, changes.is_empty())?;

  let staged = match ctx.staging {
    Some(layout) => {
      advance(&spec.name, state, ModuleState::Staging);
      Some(stage_module(spec, layout, session, &linked.artifact)?)
    }
    None => None,
  };

  advance(&spec.name, state, ModuleState::Done);
  Ok(ModuleReport {
    name: spec.name.clone(),
    compiled: changes.to_compile,
    objects,
    artifact: linked.artifact,
    linked: linked.relinked,
    staged,
  })
}
