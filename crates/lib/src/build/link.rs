//! Linking, merging and post-link fix-ups.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::module::ModuleContext;
use super::types::{BuildError, ToolContext};
use crate::config::{ConfigError, LinkOutput, ModuleKind};
use crate::flags::{Flag, FlagSet};
use crate::session::BuildEvent;
use crate::toolchain::rpaths;
use crate::util::fs::{outputs_of, remove_if_exists};

/// Where a linked module ends up before staging.
pub fn artifact_path(ctx: &ModuleContext<'_>) -> PathBuf {
  let spec = ctx.spec;
  let dir = match spec.kind {
    ModuleKind::Executable => ctx.session.bin_dir(&spec.name),
    _ => ctx.session.dylib_dir(&spec.name),
  };
  dir.join(&spec.install_name)
}

/// Linker arguments for one architecture.
pub fn link_args(ctx: &ModuleContext<'_>, arch: &str) -> Result<Vec<String>, BuildError> {
  let spec = ctx.spec;
  let meta = ctx.meta;

  let mut args = Vec::new();
  if spec.use_arc {
    args.push("-fobjc-arc".to_string());
  }
  args.push("-isysroot".to_string());
  args.push(meta.sdk.display().to_string());
  args.push(format!("-O{}", spec.optimization));

  let mut search = FlagSet::new();
  search.extend(spec.library_dirs.iter().map(|d| Flag::LibraryDir(d.clone())));
  search.insert(Flag::LibraryDir(ctx.vendor.lib.clone()));
  if spec.uses_swift() {
    search.insert(Flag::LibraryDir(meta.sdk.join("usr").join("lib").join("swift")));
  }
  search.extend(spec.framework_dirs.iter().map(|d| Flag::FrameworkDir(d.clone())));
  if !spec.private_frameworks.is_empty() {
    let private = meta.sdk.join("System").join("Library").join("PrivateFrameworks");
    if !private.is_dir() {
      return Err(
        ConfigError::Module {
          module: spec.name.clone(),
          message: format!("private frameworks requested but {} does not exist", private.display()),
        }
        .into(),
      );
    }
    search.insert(Flag::FrameworkDir(private));
  }
  search.extend(spec.libraries.iter().map(|l| Flag::Library(l.clone())));
  search.extend(spec.frameworks.iter().map(|f| Flag::Framework(f.clone())));
  search.extend(spec.private_frameworks.iter().map(|f| Flag::Framework(f.clone())));
  args.extend(search.to_args());

  args.push(meta.version_min_flag());
  if meta.debug {
    args.push("-g".to_string());
  }
  if spec.kind.link_output() == LinkOutput::DynamicLibrary {
    args.push("-dynamiclib".to_string());
    args.push(format!(
      "-Wl,-install_name,{}/{}/{}",
      meta.install_root(),
      spec.install_dir.display(),
      spec.install_name
    ));
  }
  args.extend(spec.warnings.iter().cloned());
  args.extend(spec.linker_flags.iter().cloned());
  args.push("-arch".to_string());
  args.push(arch.to_string());
  Ok(args)
}

/// The current object of every declared source for `arch`, in declaration order.
fn objects_for(ctx: &ModuleContext<'_>, arch: &str) -> Result<Vec<PathBuf>, BuildError> {
  let arch_dir = ctx.session.obj_dir(&ctx.spec.name).join(arch);
  ctx
    .spec
    .files
    .iter()
    .map(|file| {
      let basename = file.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
      outputs_of(&arch_dir, &basename)
        .into_iter()
        .filter(|p| p.extension().is_some_and(|e| e == "o"))
        .next_back()
        .ok_or_else(|| BuildError::Io {
          module: None,
          path: arch_dir.join(format!("{}-*.o", basename)),
          source: std::io::Error::new(std::io::ErrorKind::NotFound, "no object for source"),
        })
    })
    .collect()
}

/// Outcome of the link stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Linked {
  pub artifact: PathBuf,
  /// False when the existing artifact was reused.
  pub relinked: bool,
}

/// Link every architecture, merge them, then fix rpaths, strip and sign.
///
/// With nothing compiled and an artifact already on disk, the artifact is
/// reused. Architectures link one after another and the first failure stops
/// the stage. Static archives skip the post-link steps.
pub fn link_module(ctx: &ModuleContext<'_>, nothing_compiled: bool) -> Result<Linked, BuildError> {
  let spec = ctx.spec;
  let artifact = artifact_path(ctx);

  if nothing_compiled && artifact.exists() {
    debug!(module = %spec.name, artifact = %artifact.display(), "reusing linked artifact");
    return Ok(Linked {
      artifact,
      relinked: false,
    });
  }

  remove_if_exists(&artifact).map_err(BuildError::io(&artifact))?;
  if let Some(dir) = artifact.parent() {
    fs::create_dir_all(dir).map_err(BuildError::io(dir))?;
  }

  ctx.session.report(BuildEvent::Linking {
    module: spec.name.clone(),
    output: spec.install_name.clone(),
  });

  let context = || ToolContext::module(&spec.name);
  let output = spec.kind.link_output();
  let mut binaries = Vec::with_capacity(ctx.meta.archs.len());
  for arch in &ctx.meta.archs {
    let objects = objects_for(ctx, arch)?;
    let out = ctx.session.obj_dir(&spec.name).join(arch).join(&spec.install_name);
    let result = match output {
      LinkOutput::StaticArchive => ctx.toolchain.archive(&objects, &out),
      LinkOutput::Executable | LinkOutput::DynamicLibrary => ctx.toolchain.link(&objects, &out, &link_args(ctx, arch)?),
    };
    result.map_err(context().arch(arch).wrap())?;
    debug!(module = %spec.name, arch = %arch, output = %out.display(), "linked");
    binaries.push(out);
  }

  let finished = ctx
    .toolchain
    .merge_architectures(&binaries, &artifact)
    .map_err(context().wrap())
    .and_then(|()| match output {
      LinkOutput::StaticArchive => Ok(()),
      LinkOutput::Executable | LinkOutput::DynamicLibrary => post_link(ctx, &artifact),
    });
  // An unsigned or half-fixed artifact must not be reused by the next build.
  if let Err(e) = finished {
    remove_if_exists(&artifact).map_err(BuildError::io(&artifact))?;
    return Err(e);
  }

  info!(module = %spec.name, artifact = %artifact.display(), "module linked");
  Ok(Linked {
    artifact,
    relinked: true,
  })
}

/// rpath fix-up, then stripping, then signing. Signing must stay last.
fn post_link(ctx: &ModuleContext<'_>, artifact: &Path) -> Result<(), BuildError> {
  let spec = ctx.spec;
  let context = || ToolContext::module(&spec.name).file(artifact);

  ctx
    .toolchain
    .fix_rpath(artifact, &rpaths(ctx.meta.install_root()))
    .map_err(context().wrap())?;

  if ctx.meta.release() && spec.kind == ModuleKind::Executable {
    ctx.toolchain.strip(artifact).map_err(context().wrap())?;
  }

  ctx
    .toolchain
    .sign(artifact, &spec.codesign_flags)
    .map_err(context().wrap())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::build::compile::compile_module;
  use crate::build::preprocess::SourceUnit;
  use crate::util::testutil::{Call, FakeToolchain, ModuleFixture};

  fn compiled(fixture: &ModuleFixture, fake: &FakeToolchain) {
    let ctx = fixture.context(fake);
    let units: Vec<SourceUnit> = fixture.files().into_iter().map(SourceUnit::PassThrough).collect();
    compile_module(&ctx, &units).unwrap();
  }

  #[test]
  fn links_each_arch_then_merges() {
    let fixture = ModuleFixture::declared(&["a.m", "b.m"], &["arm64", "arm64e"], "type = \"library\"", &[]);
    let fake = FakeToolchain::new();
    compiled(&fixture, &fake);

    let linked = link_module(&fixture.context(&fake), false).unwrap();
    assert!(linked.relinked);
    assert_eq!(linked.artifact, fixture.session.dylib_dir("Hello").join("Hello.dylib"));
    assert!(linked.artifact.exists());

    let links = fake.calls_of(Call::Link);
    assert_eq!(links.len(), 2);
    assert_eq!(links[0].inputs.len(), 2);
    assert!(links[0].args.contains(&"-dynamiclib".to_string()));
    assert!(links[0].args.contains(&"-Wl,-install_name,/var/jb/usr/lib/Hello.dylib".to_string()));

    let merges = fake.calls_of(Call::Merge);
    assert_eq!(merges.len(), 1);
    assert_eq!(merges[0].inputs.len(), 2);
  }

  #[test]
  fn strip_precedes_sign() {
    let fixture = ModuleFixture::declared(&["main.m"], &["arm64"], "type = \"tool\"", &["release=true"]);
    for _ in 0..10 {
      let fake = FakeToolchain::new();
      compiled(&fixture, &fake);
      link_module(&fixture.context(&fake), false).unwrap();

      let order: Vec<Call> = fake.calls().into_iter().map(|r| r.call).filter(|c| *c != Call::Compile).collect();
      assert_eq!(order, vec![Call::Link, Call::Merge, Call::FixRpath, Call::Strip, Call::Sign]);
      let strip = &fake.calls_of(Call::Strip)[0];
      let sign = &fake.calls_of(Call::Sign)[0];
      assert!(strip.finished < sign.started);
    }
  }

  #[test]
  fn debug_builds_do_not_strip() {
    let fixture = ModuleFixture::declared(&["main.m"], &["arm64"], "type = \"tool\"", &[]);
    let fake = FakeToolchain::new();
    compiled(&fixture, &fake);
    let linked = link_module(&fixture.context(&fake), false).unwrap();

    assert_eq!(linked.artifact, fixture.session.bin_dir("Hello").join("Hello"));
    assert!(fake.calls_of(Call::Strip).is_empty());
    let sign = &fake.calls_of(Call::Sign)[0];
    assert_eq!(sign.args, vec!["-S".to_string()]);
    let rpath = &fake.calls_of(Call::FixRpath)[0];
    assert_eq!(rpath.args, vec!["/var/jb/usr/lib/", "/var/jb/Library/Frameworks/"]);
  }

  #[test]
  fn static_archives_skip_post_link() {
    let fixture = ModuleFixture::declared(&["a.c"], &["arm64", "arm64e"], "type = \"static\"", &[]);
    let fake = FakeToolchain::new();
    compiled(&fixture, &fake);
    link_module(&fixture.context(&fake), false).unwrap();

    assert_eq!(fake.calls_of(Call::Archive).len(), 2);
    assert!(fake.calls_of(Call::Link).is_empty());
    assert!(fake.calls_of(Call::FixRpath).is_empty());
    assert!(fake.calls_of(Call::Sign).is_empty());
  }

  #[test]
  fn first_arch_failure_stops_linking() {
    let fixture = ModuleFixture::declared(&["a.m"], &["arm64", "arm64e"], "type = \"library\"", &[]);
    let fake = FakeToolchain::new().fail_call(Call::Link);
    compiled(&fixture, &fake);

    let err = link_module(&fixture.context(&fake), false).unwrap_err();
    match err {
      BuildError::Tool { context, .. } => assert_eq!(context.arch.as_deref(), Some("arm64")),
      other => panic!("unexpected error {other}"),
    }
    assert_eq!(fake.calls_of(Call::Link).len(), 1);
    assert!(fake.calls_of(Call::Merge).is_empty());
  }

  #[test]
  fn failed_post_link_step_removes_the_artifact() {
    for call in [Call::FixRpath, Call::Sign] {
      let fixture = ModuleFixture::declared(&["a.m"], &["arm64"], "type = \"library\"", &[]);
      let fake = FakeToolchain::new().fail_call(call);
      compiled(&fixture, &fake);

      let err = link_module(&fixture.context(&fake), false).unwrap_err();
      assert_eq!(err.module(), Some("Hello"));
      assert_eq!(fake.calls_of(Call::Merge).len(), 1);
      assert!(!artifact_path(&fixture.context(&fake)).exists());
    }
  }

  #[test]
  fn reuses_existing_artifact_when_nothing_compiled() {
    let fixture = ModuleFixture::declared(&["a.m"], &["arm64"], "type = \"library\"", &[]);
    let fake = FakeToolchain::new();
    compiled(&fixture, &fake);
    link_module(&fixture.context(&fake), false).unwrap();

    let again = FakeToolchain::new();
    let linked = link_module(&fixture.context(&again), true).unwrap();
    assert!(!linked.relinked);
    assert!(again.calls().is_empty());
  }

  #[test]
  fn private_frameworks_need_the_sdk_directory() {
    let fixture = ModuleFixture::declared(&["Root.m"], &["arm64"], "type = \"prefs\"", &[]);
    let fake = FakeToolchain::new();
    let err = link_args(&fixture.context(&fake), "arm64").unwrap_err();
    assert!(matches!(err, BuildError::Config(ConfigError::Module { .. })));

    fs::create_dir_all(fixture.meta.sdk.join("System/Library/PrivateFrameworks")).unwrap();
    let args = link_args(&fixture.context(&fake), "arm64").unwrap();
    let framework = args.iter().position(|a| a == "Preferences").unwrap();
    assert_eq!(args[framework - 1], "-framework");
  }
}
