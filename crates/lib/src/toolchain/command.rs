//! Toolchain backed by real subprocesses.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use super::{CompileJob, Language, ToolError, Toolchain};
use crate::config::{BuildMeta, ConfigError};
use crate::platform::tools::find_tool;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Which optional tools a project will actually call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ToolRequirements {
  pub swift: bool,
  pub archive: bool,
  pub strip: bool,
  pub preprocessor: bool,
}

/// Spawns the discovered tools with [`std::process::Command`].
#[derive(Debug, Clone)]
pub struct CommandToolchain {
  cc: PathBuf,
  lipo: PathBuf,
  ldid: PathBuf,
  install_name_tool: PathBuf,
  swift: Option<PathBuf>,
  libtool: Option<PathBuf>,
  strip: Option<PathBuf>,
  preprocessor: Option<PathBuf>,
  timeout: Option<Duration>,
}

impl CommandToolchain {
  /// Discover every tool the project needs, failing before any work starts.
  pub fn from_meta(
    meta: &BuildMeta,
    needs: ToolRequirements,
    preprocessor: Option<PathBuf>,
  ) -> Result<Self, ConfigError> {
    let prefix = meta.prefix.as_deref();
    let find = |tool: &'static str, name: &str| {
      find_tool(name, prefix).ok_or_else(|| ConfigError::ToolNotFound {
        tool,
        name: name.to_string(),
      })
    };
    let find_if = |wanted: bool, tool: &'static str, name: &str| wanted.then(|| find(tool, name)).transpose();

    let preprocessor = match preprocessor {
      Some(path) if needs.preprocessor => {
        if !path.is_file() {
          return Err(ConfigError::ToolNotFound {
            tool: "preprocessor",
            name: path.display().to_string(),
          });
        }
        Some(path)
      }
      _ => None,
    };

    let toolchain = Self {
      cc: find("compiler", &meta.tools.cc)?,
      lipo: find("lipo", &meta.tools.lipo)?,
      ldid: find("ldid", &meta.tools.ldid)?,
      install_name_tool: find("install_name_tool", &meta.tools.install_name_tool)?,
      swift: find_if(needs.swift, "swift compiler", &meta.tools.swift)?,
      libtool: find_if(needs.archive, "libtool", &meta.tools.libtool)?,
      strip: find_if(needs.strip, "strip", &meta.tools.strip)?,
      preprocessor,
      timeout: meta.tool_timeout,
    };
    debug!(cc = %toolchain.cc.display(), "discovered toolchain");
    Ok(toolchain)
  }

  fn run(&self, tool: &str, program: &Path, args: &[String]) -> Result<String, ToolError> {
    run_tool(tool, program, args, self.timeout)
  }

  fn optional<'a>(&self, tool: &str, path: &'a Option<PathBuf>) -> Result<&'a Path, ToolError> {
    path.as_deref().ok_or_else(|| ToolError::Spawn {
      tool: tool.to_string(),
      source: std::io::Error::new(std::io::ErrorKind::NotFound, "tool was not discovered for this project"),
    })
  }
}

/// Run `program`, returning its standard output on success.
///
/// With a `timeout` the child is killed once it runs longer than that.
pub(crate) fn run_tool(
  tool: &str,
  program: &Path,
  args: &[String],
  timeout: Option<Duration>,
) -> Result<String, ToolError> {
  trace!(tool, program = %program.display(), args = ?args, "spawning");

  let mut child = Command::new(program)
    .args(args)
    .stdin(Stdio::null())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .spawn()
    .map_err(|source| ToolError::Spawn {
      tool: tool.to_string(),
      source,
    })?;

  let stdout = drain(child.stdout.take());
  let stderr = drain(child.stderr.take());

  let status = match timeout {
    Some(limit) => wait_with_timeout(&mut child, limit),
    None => child.wait().map(Some),
  }
  .map_err(|source| ToolError::Spawn {
    tool: tool.to_string(),
    source,
  })?;

  let stdout = stdout.join().unwrap_or_default();
  let stderr = stderr.join().unwrap_or_default();

  let Some(status) = status else {
    return Err(ToolError::Timeout {
      tool: tool.to_string(),
      timeout: timeout.unwrap_or_default(),
    });
  };

  if !status.success() {
    let stderr = String::from_utf8_lossy(&stderr).trim().to_string();
    debug!(tool, code = ?status.code(), stderr = %stderr, "tool failed");
    return Err(ToolError::Failed {
      tool: tool.to_string(),
      code: status.code(),
      stderr,
    });
  }

  Ok(String::from_utf8_lossy(&stdout).into_owned())
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<Vec<u8>> {
  thread::spawn(move || {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
      let _ = pipe.read_to_end(&mut buf);
    }
    buf
  })
}

/// Wait for `child`, killing it once `limit` elapses. `None` means it was killed.
fn wait_with_timeout(child: &mut Child, limit: Duration) -> std::io::Result<Option<ExitStatus>> {
  let start = Instant::now();
  loop {
    if let Some(status) = child.try_wait()? {
      return Ok(Some(status));
    }
    if start.elapsed() >= limit {
      child.kill()?;
      child.wait()?;
      return Ok(None);
    }
    thread::sleep(POLL_INTERVAL);
  }
}

fn path_args(paths: &[PathBuf]) -> impl Iterator<Item = String> + '_ {
  paths.iter().map(|p| p.display().to_string())
}

impl Toolchain for CommandToolchain {
  fn compile(&self, job: &CompileJob<'_>) -> Result<(), ToolError> {
    match job.language {
      Language::CFamily => {
        let mut args = job.args.to_vec();
        args.push(job.source.display().to_string());
        args.push("-o".to_string());
        args.push(job.output.display().to_string());
        self.run("compiler", &self.cc, &args).map(drop)
      }
      Language::Swift => {
        let swift = self.optional("swift compiler", &self.swift)?;
        let mut args = vec!["-frontend".to_string(), "-c".to_string()];
        args.extend(job.args.iter().cloned());
        args.push("-primary-file".to_string());
        args.push(job.source.display().to_string());
        args.extend(path_args(job.siblings));
        args.push("-o".to_string());
        args.push(job.output.display().to_string());
        self.run("swift compiler", swift, &args).map(drop)
      }
    }
  }

  fn link(&self, objects: &[PathBuf], output: &Path, args: &[String]) -> Result<(), ToolError> {
    let mut all = args.to_vec();
    all.extend(path_args(objects));
    all.push("-o".to_string());
    all.push(output.display().to_string());
    self.run("linker", &self.cc, &all).map(drop)
  }

  fn archive(&self, objects: &[PathBuf], output: &Path) -> Result<(), ToolError> {
    let libtool = self.optional("libtool", &self.libtool)?;
    let mut args = vec!["-static".to_string(), "-o".to_string(), output.display().to_string()];
    args.extend(path_args(objects));
    self.run("libtool", libtool, &args).map(drop)
  }

  fn merge_architectures(&self, binaries: &[PathBuf], output: &Path) -> Result<(), ToolError> {
    let mut args = vec!["-create".to_string(), "-output".to_string(), output.display().to_string()];
    args.extend(path_args(binaries));
    self.run("lipo", &self.lipo, &args).map(drop)
  }

  fn preprocess(&self, file: &Path) -> Result<String, ToolError> {
    let preprocessor = self.optional("preprocessor", &self.preprocessor)?;
    self.run("preprocessor", preprocessor, &[file.display().to_string()])
  }

  fn fix_rpath(&self, file: &Path, rpaths: &[String]) -> Result<(), ToolError> {
    let mut args = Vec::with_capacity(rpaths.len() * 2 + 1);
    for rpath in rpaths {
      args.push("-add_rpath".to_string());
      args.push(rpath.clone());
    }
    args.push(file.display().to_string());
    self.run("install_name_tool", &self.install_name_tool, &args).map(drop)
  }

  fn strip(&self, file: &Path) -> Result<(), ToolError> {
    let strip = self.optional("strip", &self.strip)?;
    self.run("strip", strip, &[file.display().to_string()]).map(drop)
  }

  fn sign(&self, file: &Path, flags: &[String]) -> Result<(), ToolError> {
    let mut args = flags.to_vec();
    args.push(file.display().to_string());
    self.run("ldid", &self.ldid, &args).map(drop)
  }
}

#[cfg(test)]
#[cfg(unix)]
mod tests {
  use super::*;
  use std::os::unix::fs::PermissionsExt;
  use tempfile::TempDir;

  fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
  }

  fn toolchain(dir: &Path, cc_body: &str, timeout: Option<Duration>) -> CommandToolchain {
    CommandToolchain {
      cc: script(dir, "cc", cc_body),
      lipo: script(dir, "lipo", "echo \"$@\" > \"$3\""),
      ldid: script(dir, "ldid", "exit 0"),
      install_name_tool: script(dir, "install_name_tool", "exit 0"),
      swift: None,
      libtool: None,
      strip: None,
      preprocessor: Some(script(dir, "logos.pl", "echo '#line 1 \"Tweak.x\"'; cat \"$1\"")),
      timeout,
    }
  }

  #[test]
  fn compile_passes_source_and_output() {
    let temp = TempDir::new().unwrap();
    let tc = toolchain(temp.path(), "for last; do :; done; echo \"$@\" > \"$last\"", None);
    let source = temp.path().join("a.m");
    let output = temp.path().join("a.m-1.o");

    tc.compile(&CompileJob {
      language: Language::CFamily,
      source: &source,
      siblings: &[],
      arch: "arm64",
      output: &output,
      args: &["-arch".to_string(), "arm64".to_string(), "-c".to_string()],
    })
    .unwrap();

    let recorded = std::fs::read_to_string(&output).unwrap();
    assert_eq!(
      recorded.trim(),
      format!("-arch arm64 -c {} -o {}", source.display(), output.display())
    );
  }

  #[test]
  fn failure_carries_exit_code_and_stderr() {
    let temp = TempDir::new().unwrap();
    let tc = toolchain(temp.path(), "echo 'a.m:1: error: boom' >&2; exit 3", None);

    let err = tc.link(&[temp.path().join("a.o")], &temp.path().join("out"), &[]).unwrap_err();
    match err {
      ToolError::Failed { tool, code, stderr } => {
        assert_eq!(tool, "linker");
        assert_eq!(code, Some(3));
        assert_eq!(stderr, "a.m:1: error: boom");
      }
      other => panic!("unexpected error: {other}"),
    }
  }

  #[test]
  fn hung_tool_times_out() {
    let temp = TempDir::new().unwrap();
    let tc = toolchain(temp.path(), "exec sleep 5", Some(Duration::from_millis(100)));

    let start = Instant::now();
    let err = tc.link(&[], &temp.path().join("out"), &[]).unwrap_err();
    assert!(matches!(err, ToolError::Timeout { .. }));
    assert!(start.elapsed() < Duration::from_secs(4));
  }

  #[test]
  fn preprocess_captures_stdout() {
    let temp = TempDir::new().unwrap();
    let tc = toolchain(temp.path(), "exit 0", None);
    let source = temp.path().join("Tweak.x");
    std::fs::write(&source, "%hook SpringBoard\n%end\n").unwrap();

    let out = tc.preprocess(&source).unwrap();
    assert!(out.starts_with("#line 1"));
    assert!(out.contains("%hook SpringBoard"));
  }

  #[test]
  fn undiscovered_tool_is_a_spawn_error() {
    let temp = TempDir::new().unwrap();
    let tc = toolchain(temp.path(), "exit 0", None);

    assert!(matches!(tc.strip(&temp.path().join("bin")), Err(ToolError::Spawn { .. })));
  }

  #[test]
  fn merge_argument_shape() {
    let temp = TempDir::new().unwrap();
    let tc = toolchain(temp.path(), "exit 0", None);
    let out = temp.path().join("Hello.dylib");

    tc.merge_architectures(&[temp.path().join("arm64"), temp.path().join("arm64e")], &out)
      .unwrap();
    let recorded = std::fs::read_to_string(&out).unwrap();
    assert!(recorded.starts_with(&format!("-create -output {}", out.display())));
  }
}
