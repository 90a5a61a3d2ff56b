//! Building a whole project tree.
//!
//! A project is loaded with its submodules into a tree before anything runs,
//! so configuration and tool discovery errors surface before the first
//! compile. The tree then runs on the session pool: every module and every
//! submodule of a project is built concurrently, results are collected in
//! declaration order (modules, then submodules) and the first failure in that
//! order is the one returned. Packing only happens when nothing failed.

pub mod package;

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use toml::Table;
use tracing::{debug, error, info, warn};

use crate::build::{BuildError, ModuleContext, ModuleReport, StagingLayout, ToolContext, build_module};
use crate::config::{BuildMeta, ConfigError, Control, ModuleKind, ModuleSpec, ProjectConfig};
use crate::consts::{PACKAGES_DIR, PROJECT_FILE, SCRATCH_DIR};
use crate::platform::tools::find_tool;
use crate::session::{BuildEvent, BuildSession, Reporter, TracingReporter};
use crate::toolchain::{CommandToolchain, ToolRequirements, Toolchain};
use crate::util::fs::remove_if_exists;
use crate::vendor::VendorDirs;
use package::{DpkgDebPacker, Packer, copy_layout, package_file_name, write_debian};

/// Knobs for one build invocation.
#[derive(Clone)]
pub struct BuildOptions {
  /// Remove the scratch directory first.
  pub clean: bool,
  /// `--meta` overrides, highest precedence.
  pub overrides: Table,
  /// Use this instead of discovering the native tools.
  pub toolchain: Option<Arc<dyn Toolchain>>,
  pub packer: Option<Arc<dyn Packer>>,
  pub reporter: Arc<dyn Reporter>,
  /// Vendor checkouts; defaults to the storage directory.
  pub vendor: Option<VendorDirs>,
}

impl Default for BuildOptions {
  fn default() -> Self {
    Self {
      clean: false,
      overrides: Table::new(),
      toolchain: None,
      packer: None,
      reporter: Arc::new(TracingReporter),
      vendor: None,
    }
  }
}

/// What a successful build produced.
#[derive(Debug, Clone)]
pub struct BuildSummary {
  /// Reports for every module in the tree, parents before children.
  pub modules: Vec<ModuleReport>,
  pub package: Option<PathBuf>,
  pub elapsed: Duration,
}

/// A loaded project with its resolved meta, session and toolchain.
pub struct Project {
  pub config: ProjectConfig,
  pub meta: Arc<BuildMeta>,
  session: Arc<BuildSession>,
  toolchain: Arc<dyn Toolchain>,
  pub children: Vec<Project>,
}

/// Shared by every project in the tree during a run.
struct RunContext<'a> {
  vendor: &'a VendorDirs,
  version: Option<&'a str>,
  staging: Option<&'a StagingLayout>,
}

/// Module names already claimed, per session.
type Claimed = HashMap<usize, HashSet<String>>;

impl Project {
  /// Load the project at `root` and everything it nests.
  pub fn load(root: &Path, options: &BuildOptions, vendor: &VendorDirs) -> Result<Self, BuildError> {
    let root = dunce::canonicalize(root).map_err(|_| ConfigError::NotFound(root.join(PROJECT_FILE)))?;
    let scratch = root.join(SCRATCH_DIR);
    if options.clean {
      remove_if_exists(&scratch).map_err(BuildError::io(&scratch))?;
      info!(scratch = %scratch.display(), "cleaned");
    }

    let config = ProjectConfig::load(&root)?;
    let meta = Arc::new(BuildMeta::resolve(&options.overrides, config.meta_table.as_ref(), None)?);
    let session = Arc::new(BuildSession::open(&scratch, meta.jobs, Arc::clone(&options.reporter))?);

    Self::prepare(config, meta, session, options, vendor, &mut Claimed::new())
  }

  fn prepare(
    config: ProjectConfig,
    meta: Arc<BuildMeta>,
    session: Arc<BuildSession>,
    options: &BuildOptions,
    vendor: &VendorDirs,
    claimed: &mut Claimed,
  ) -> Result<Self, BuildError> {
    let names = claimed.entry(Arc::as_ptr(&session) as usize).or_default();
    for module in &config.modules {
      if !names.insert(module.name.clone()) {
        return Err(ConfigError::DuplicateModule(module.name.clone()).into());
      }
    }

    let needs = requirements(&config, &meta);
    let bundled_preprocessor = needs.preprocessor && meta.preprocessor.is_none();
    fetch_vendor(&config, &meta, &session, vendor, bundled_preprocessor)?;

    let toolchain: Arc<dyn Toolchain> = match &options.toolchain {
      Some(toolchain) => Arc::clone(toolchain),
      None => {
        let preprocessor = meta.preprocessor.clone().or_else(|| Some(vendor.preprocessor()));
        Arc::new(CommandToolchain::from_meta(&meta, needs, preprocessor)?)
      }
    };

    let mut children = Vec::with_capacity(config.submodules.len());
    for submodule in &config.submodules {
      let child_config = ProjectConfig::load(&submodule.path)?;
      let child_meta = match (&child_config.meta_table, submodule.inherit) {
        (None, true) => Arc::clone(&meta),
        (declared, inherit) => Arc::new(BuildMeta::resolve(
          &options.overrides,
          declared.as_ref(),
          inherit.then(|| meta.effective_table()),
        )?),
      };
      let child_session = if submodule.inherit {
        Arc::clone(&session)
      } else {
        let scratch = child_config.root.join(SCRATCH_DIR);
        if options.clean {
          remove_if_exists(&scratch).map_err(BuildError::io(&scratch))?;
        }
        Arc::new(session.independent(&scratch)?)
      };
      debug!(submodule = %submodule.name(), inherit = submodule.inherit, "prepared submodule");
      children.push(Self::prepare(child_config, child_meta, child_session, options, vendor, claimed)?);
    }

    Ok(Self {
      config,
      meta,
      session,
      toolchain,
      children,
    })
  }

  pub fn name(&self) -> String {
    self.config.name()
  }

  /// Build the tree, then pack it when packing applies.
  ///
  /// Hash lists are saved whether or not the build succeeded.
  pub fn build(&self, options: &BuildOptions, vendor: &VendorDirs) -> Result<BuildSummary, BuildError> {
    let started = Instant::now();
    let control = self.config.control.as_ref().filter(|_| self.meta.pack);

    let packer: Option<Arc<dyn Packer>> = match (control, &options.packer) {
      (None, _) => None,
      (Some(_), Some(packer)) => Some(Arc::clone(packer)),
      (Some(_), None) => Some(Arc::new(DpkgDebPacker::from_meta(&self.meta)?)),
    };
    if self.meta.pack && self.config.control.is_none() {
      self.session.report(BuildEvent::Caution {
        module: None,
        message: "no control found, packing is disabled".to_string(),
      });
    }

    let version = self.config.control.as_ref().map(|control| {
      if packer.is_some() && self.meta.debug {
        control.debug_version(self.session.bump_build_number())
      } else {
        control.version.clone()
      }
    });

    let layout = StagingLayout::new(self.session.scratch(), self.meta.rootless);
    if packer.is_some() {
      remove_if_exists(layout.staging()).map_err(BuildError::io(layout.staging()))?;
    }

    let ctx = RunContext {
      vendor,
      version: version.as_deref(),
      staging: packer.is_some().then_some(&layout),
    };
    let result = self.session.pool().install(|| self.run(&ctx));
    let saved = self.save_all();

    let modules = match (result, saved) {
      (Ok(modules), Ok(())) => modules,
      (Ok(_), Err(e)) => return Err(e),
      (Err(e), saved) => {
        if let Err(save_err) = saved {
          error!(error = %save_err, "failed to save hash list");
        }
        return Err(e);
      }
    };

    let package = match (packer, control, version) {
      (Some(packer), Some(control), Some(version)) => {
        let mut control = control.clone();
        control.version = version;
        Some(self.pack(packer.as_ref(), &layout, &control)?)
      }
      _ => None,
    };

    Ok(BuildSummary {
      modules,
      package,
      elapsed: started.elapsed(),
    })
  }

  fn run(&self, ctx: &RunContext<'_>) -> Result<Vec<ModuleReport>, BuildError> {
    self.session.report(BuildEvent::Project { name: self.name() });

    let (modules, children) = rayon::join(
      || {
        self
          .config
          .modules
          .par_iter()
          .map(|spec| {
            build_module(&ModuleContext {
              spec,
              meta: &self.meta,
              session: &self.session,
              toolchain: self.toolchain.as_ref(),
              vendor: ctx.vendor,
              package_version: ctx.version,
              staging: ctx.staging,
            })
          })
          .collect::<Vec<_>>()
      },
      || self.children.par_iter().map(|child| child.run(ctx)).collect::<Vec<_>>(),
    );

    let mut reports = Vec::new();
    let mut first_error = None;
    for result in modules {
      match result {
        Ok(report) => reports.push(report),
        Err(e) => {
          first_error.get_or_insert(e);
        }
      }
    }
    for result in children {
      match result {
        Ok(child_reports) => reports.extend(child_reports),
        Err(e) => {
          first_error.get_or_insert(e);
        }
      }
    }

    match first_error {
      Some(e) => Err(e),
      None => Ok(reports),
    }
  }

  fn sessions<'a>(&'a self, out: &mut Vec<&'a Arc<BuildSession>>) {
    if !out.iter().any(|s| Arc::ptr_eq(s, &self.session)) {
      out.push(&self.session);
    }
    for child in &self.children {
      child.sessions(out);
    }
  }

  /// Save every distinct session in the tree, returning the first failure.
  fn save_all(&self) -> Result<(), BuildError> {
    let mut sessions = Vec::new();
    self.sessions(&mut sessions);
    let mut first_error = None;
    for session in sessions {
      if let Err(e) = session.save() {
        warn!(scratch = %session.scratch().display(), error = %e, "saving hash list failed");
        first_error.get_or_insert(e);
      }
    }
    match first_error {
      Some(e) => Err(e.into()),
      None => Ok(()),
    }
  }

  fn layouts<'a>(&'a self, out: &mut Vec<&'a Path>) {
    out.push(&self.config.root);
    for child in &self.children {
      child.layouts(out);
    }
  }

  fn pack(&self, packer: &dyn Packer, layout: &StagingLayout, control: &Control) -> Result<PathBuf, BuildError> {
    let mut roots = Vec::new();
    self.layouts(&mut roots);
    for root in roots {
      copy_layout(root, layout.root())?;
    }
    write_debian(layout.staging(), control, &self.config.scripts)?;

    let output = self.config.root.join(PACKAGES_DIR).join(package_file_name(control));
    self.session.report(BuildEvent::Packing { output: output.clone() });
    Ok(packer.pack(layout.staging(), self.meta.compression, &output)?)
  }
}

fn requirements(config: &ProjectConfig, meta: &BuildMeta) -> ToolRequirements {
  let any = |f: fn(&ModuleSpec) -> bool| config.modules.iter().any(f);
  ToolRequirements {
    swift: any(|m| m.uses_swift()),
    archive: any(|m| m.kind == ModuleKind::StaticLibrary),
    strip: meta.release() && any(|m| m.kind == ModuleKind::Executable),
    preprocessor: any(|m| m.uses_preprocessor()),
  }
}

/// Clone vendor checkouts the project needs but the host lacks.
fn fetch_vendor(
  config: &ProjectConfig,
  meta: &BuildMeta,
  session: &BuildSession,
  vendor: &VendorDirs,
  with_preprocessor: bool,
) -> Result<(), BuildError> {
  let missing =
    !vendor.headers.exists() || !vendor.lib.exists() || (with_preprocessor && !vendor.logos.exists());
  if !missing {
    return Ok(());
  }

  let git = find_tool(&meta.tools.git, meta.prefix.as_deref()).ok_or_else(|| ConfigError::ToolNotFound {
    tool: "git",
    name: meta.tools.git.clone(),
  })?;
  vendor
    .ensure(&git, with_preprocessor, |what| {
      session.report(BuildEvent::Fetching { what: what.to_string() })
    })
    .map_err(ToolContext::module(&config.name()).wrap())
}

/// Load and build the project at `root`.
pub fn build(root: &Path, options: &BuildOptions) -> Result<BuildSummary, BuildError> {
  let vendor = options.vendor.clone().unwrap_or_else(VendorDirs::from_storage);
  let project = Project::load(root, options, &vendor)?;
  info!(
    project = %project.name(),
    modules = project.config.modules.len(),
    submodules = project.children.len(),
    "building"
  );
  project.build(options, &vendor)
}
