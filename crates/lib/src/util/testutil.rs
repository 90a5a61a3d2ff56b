//! Test doubles for luz-lib.
//!
//! [`FakeToolchain`] stands in for the native toolchain: it records every
//! call with a process-wide sequence number, writes placeholder outputs and
//! can be told to fail or stall on particular files. [`ModuleFixture`] sets
//! up a project directory, meta and session around a single module.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use tempfile::TempDir;
use toml::Table;

use crate::build::ModuleContext;
use crate::config::meta::overrides_table;
use crate::config::{BuildMeta, Compression, ModuleSpec};
use crate::consts::SCRATCH_DIR;
use crate::project::package::{PackageError, Packer};
use crate::session::{BuildEvent, BuildSession, Reporter};
use crate::toolchain::{CompileJob, Language, ToolError, Toolchain};
use crate::vendor::VendorDirs;

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

fn next_seq() -> u64 {
  SEQUENCE.fetch_add(1, Ordering::SeqCst)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Call {
  Compile,
  Link,
  Archive,
  Merge,
  Preprocess,
  FixRpath,
  Strip,
  Sign,
}

/// One toolchain invocation.
#[derive(Debug, Clone)]
pub struct Record {
  pub call: Call,
  /// Output for producing calls, the operated-on file otherwise.
  pub path: PathBuf,
  pub inputs: Vec<PathBuf>,
  pub arch: Option<String>,
  pub args: Vec<String>,
  pub started: u64,
  pub finished: u64,
}

/// Owned copy of a [`CompileJob`].
#[derive(Debug, Clone)]
pub struct RecordedJob {
  pub language: Language,
  pub source: PathBuf,
  pub siblings: Vec<PathBuf>,
  pub arch: String,
  pub output: PathBuf,
  pub args: Vec<String>,
}

#[derive(Debug, Default)]
pub struct FakeToolchain {
  records: Mutex<Vec<Record>>,
  jobs: Mutex<Vec<RecordedJob>>,
  failing: HashSet<String>,
  failing_calls: HashSet<Call>,
  delays: HashMap<String, Duration>,
  preprocess_outputs: HashMap<String, String>,
}

/// Whether `path` is the file `name` or an expansion of it (`Tweak.x.m`).
fn names_file(path: &Path, name: &str) -> bool {
  let Some(file_name) = path.file_name().map(|n| n.to_string_lossy()) else {
    return false;
  };
  file_name == name || file_name.starts_with(&format!("{}.", name))
}

impl FakeToolchain {
  pub fn new() -> Self {
    Self::default()
  }

  /// Fail compiles of `name`.
  pub fn fail(mut self, name: &str) -> Self {
    self.failing.insert(name.to_string());
    self
  }

  /// Fail every call of this kind.
  pub fn fail_call(mut self, call: Call) -> Self {
    self.failing_calls.insert(call);
    self
  }

  /// Sleep before finishing compiles of `name`.
  pub fn delay(mut self, name: &str, delay: Duration) -> Self {
    self.delays.insert(name.to_string(), delay);
    self
  }

  /// Return `output` when preprocessing `name`.
  pub fn preprocess_output(mut self, name: &str, output: &str) -> Self {
    self.preprocess_outputs.insert(name.to_string(), output.to_string());
    self
  }

  /// Every call, in start order.
  pub fn calls(&self) -> Vec<Record> {
    let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner).clone();
    records.sort_by_key(|r| r.started);
    records
  }

  pub fn calls_of(&self, call: Call) -> Vec<Record> {
    self.calls().into_iter().filter(|r| r.call == call).collect()
  }

  pub fn compile_jobs(&self) -> Vec<RecordedJob> {
    self.jobs.lock().unwrap_or_else(PoisonError::into_inner).clone()
  }

  fn record(&self, call: Call, path: &Path, inputs: &[PathBuf], arch: Option<&str>, args: &[String], started: u64) {
    let record = Record {
      call,
      path: path.to_path_buf(),
      inputs: inputs.to_vec(),
      arch: arch.map(str::to_string),
      args: args.to_vec(),
      started,
      finished: next_seq(),
    };
    self.records.lock().unwrap_or_else(PoisonError::into_inner).push(record);
  }

  fn outcome(&self, call: Call, path: &Path) -> Result<(), ToolError> {
    if self.failing_calls.contains(&call) {
      return Err(ToolError::Failed {
        tool: format!("{:?}", call).to_lowercase(),
        code: Some(1),
        stderr: format!("{}: simulated failure", path.display()),
      });
    }
    Ok(())
  }

  fn write_output(path: &Path, content: String) {
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
  }
}

fn arch_of(output: &Path) -> Option<String> {
  output
    .parent()
    .and_then(|p| p.file_name())
    .map(|n| n.to_string_lossy().into_owned())
}

impl Toolchain for FakeToolchain {
  fn compile(&self, job: &CompileJob<'_>) -> Result<(), ToolError> {
    let started = next_seq();
    if let Some((_, delay)) = self.delays.iter().find(|(name, _)| names_file(job.source, name)) {
      thread::sleep(*delay);
    }
    self.jobs.lock().unwrap_or_else(PoisonError::into_inner).push(RecordedJob {
      language: job.language,
      source: job.source.to_path_buf(),
      siblings: job.siblings.to_vec(),
      arch: job.arch.to_string(),
      output: job.output.to_path_buf(),
      args: job.args.to_vec(),
    });

    let failed = self.failing.iter().any(|name| names_file(job.source, name));
    let result = if failed {
      Err(ToolError::Failed {
        tool: "clang".to_string(),
        code: Some(1),
        stderr: format!("{}: error: simulated", job.source.display()),
      })
    } else {
      self.outcome(Call::Compile, job.source)
    };
    if result.is_ok() {
      Self::write_output(job.output, format!("object {} {}", job.source.display(), job.arch));
    }
    self.record(Call::Compile, job.source, &[], Some(job.arch), job.args, started);
    result
  }

  fn link(&self, objects: &[PathBuf], output: &Path, args: &[String]) -> Result<(), ToolError> {
    let started = next_seq();
    let result = self.outcome(Call::Link, output);
    if result.is_ok() {
      Self::write_output(output, format!("linked {}", objects.len()));
    }
    self.record(Call::Link, output, objects, arch_of(output).as_deref(), args, started);
    result
  }

  fn archive(&self, objects: &[PathBuf], output: &Path) -> Result<(), ToolError> {
    let started = next_seq();
    let result = self.outcome(Call::Archive, output);
    if result.is_ok() {
      Self::write_output(output, format!("archive {}", objects.len()));
    }
    self.record(Call::Archive, output, objects, arch_of(output).as_deref(), &[], started);
    result
  }

  fn merge_architectures(&self, binaries: &[PathBuf], output: &Path) -> Result<(), ToolError> {
    let started = next_seq();
    let result = self.outcome(Call::Merge, output);
    if result.is_ok() {
      Self::write_output(output, format!("universal {}", binaries.len()));
    }
    self.record(Call::Merge, output, binaries, None, &[], started);
    result
  }

  fn preprocess(&self, file: &Path) -> Result<String, ToolError> {
    let started = next_seq();
    let output = match self.preprocess_outputs.iter().find(|(name, _)| names_file(file, name)) {
      Some((_, output)) => output.clone(),
      None => format!("#line 1 \"{}\"\n{}", file.display(), fs::read_to_string(file).unwrap_or_default()),
    };
    let result = self.outcome(Call::Preprocess, file).map(|_| output);
    self.record(Call::Preprocess, file, &[], None, &[], started);
    result
  }

  fn fix_rpath(&self, file: &Path, rpaths: &[String]) -> Result<(), ToolError> {
    let started = next_seq();
    let result = self.outcome(Call::FixRpath, file);
    self.record(Call::FixRpath, file, &[], None, rpaths, started);
    result
  }

  fn strip(&self, file: &Path) -> Result<(), ToolError> {
    let started = next_seq();
    let result = self.outcome(Call::Strip, file);
    self.record(Call::Strip, file, &[], None, &[], started);
    result
  }

  fn sign(&self, file: &Path, flags: &[String]) -> Result<(), ToolError> {
    let started = next_seq();
    let result = self.outcome(Call::Sign, file);
    self.record(Call::Sign, file, &[], None, flags, started);
    result
  }
}

/// Collects every reported event.
#[derive(Debug, Default)]
pub struct RecordingReporter {
  events: Mutex<Vec<BuildEvent>>,
}

impl RecordingReporter {
  pub fn events(&self) -> Vec<BuildEvent> {
    self.events.lock().unwrap_or_else(PoisonError::into_inner).clone()
  }
}

impl Reporter for RecordingReporter {
  fn report(&self, event: &BuildEvent) {
    self.events.lock().unwrap_or_else(PoisonError::into_inner).push(event.clone());
  }
}

/// Records pack requests and writes an empty archive.
#[derive(Debug, Default)]
pub struct FakePacker {
  packed: Mutex<Vec<(PathBuf, Compression, PathBuf)>>,
}

impl FakePacker {
  pub fn packed(&self) -> Vec<(PathBuf, Compression, PathBuf)> {
    self.packed.lock().unwrap_or_else(PoisonError::into_inner).clone()
  }
}

impl Packer for FakePacker {
  fn pack(&self, staging: &Path, compression: Compression, output: &Path) -> Result<PathBuf, PackageError> {
    FakeToolchain::write_output(output, String::new());
    self
      .packed
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .push((staging.to_path_buf(), compression, output.to_path_buf()));
    Ok(output.to_path_buf())
  }
}

/// A project directory holding one module named `Hello`.
pub struct ModuleFixture {
  pub temp: TempDir,
  pub root: PathBuf,
  pub meta: BuildMeta,
  pub session: BuildSession,
  pub spec: ModuleSpec,
  pub vendor: VendorDirs,
  pub reporter: Arc<RecordingReporter>,
}

impl ModuleFixture {
  /// A tool module over `files`.
  pub fn new(files: &[&str], archs: &[&str]) -> Self {
    Self::declared(files, archs, "type = \"tool\"", &[])
  }

  /// `declaration` is appended to the module table; `meta` are extra
  /// `key=value` overrides.
  pub fn declared(files: &[&str], archs: &[&str], declaration: &str, meta: &[&str]) -> Self {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("project");
    for file in files {
      let path = root.join(file);
      fs::create_dir_all(path.parent().unwrap()).unwrap();
      fs::write(&path, format!("// {}\n", file)).unwrap();
    }
    let sdk = temp.path().join("iPhoneOS.sdk");
    fs::create_dir_all(&sdk).unwrap();

    let mut overrides = vec![
      format!("sdk={}", sdk.display()),
      format!("archs=[{}]", archs.join(", ")),
    ];
    overrides.extend(meta.iter().map(|m| m.to_string()));
    let meta = BuildMeta::resolve(&overrides_table(&overrides).unwrap(), None, None).unwrap();

    let quoted: Vec<String> = files.iter().map(|f| format!("\"{}\"", f)).collect();
    let table: Table = toml::from_str(&format!(
      "name = \"Hello\"\nfiles = [{}]\n{}",
      quoted.join(", "),
      declaration
    ))
    .unwrap();
    let spec = ModuleSpec::from_table(&table, &Table::new(), &root).unwrap();

    let reporter = Arc::new(RecordingReporter::default());
    let session = BuildSession::open(&root.join(SCRATCH_DIR), Some(4), reporter.clone()).unwrap();
    let vendor = VendorDirs::under(&temp.path().join("vendor"));

    Self {
      temp,
      root,
      meta,
      session,
      spec,
      vendor,
      reporter,
    }
  }

  pub fn files(&self) -> Vec<PathBuf> {
    self.spec.files.clone()
  }

  pub fn context<'a>(&'a self, toolchain: &'a dyn Toolchain) -> ModuleContext<'a> {
    ModuleContext {
      spec: &self.spec,
      meta: &self.meta,
      session: &self.session,
      toolchain,
      vendor: &self.vendor,
      package_version: None,
      staging: None,
    }
  }

  /// Save the session and open a fresh one, as the next build would.
  pub fn reopen(&mut self) {
    self.session.save().unwrap();
    self.session = BuildSession::open(self.session.scratch(), Some(4), self.reporter.clone()).unwrap();
  }

  pub fn write(&self, file: &str, content: &str) {
    fs::write(self.root.join(file), content).unwrap();
  }
}
