//! Shared test helpers for CLI integration tests.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

/// Writes `-o <out>` and appends its arguments to `tools.log`. Sources
/// named `Broken.m` fail to compile.
const FAKE_CC: &str = r#"#!/bin/sh
echo "cc $*" >> "$LUZ_TEST_LOG"
out=""
while [ $# -gt 0 ]; do
  case "$1" in
    -o) out="$2"; shift ;;
    *Broken.m) echo "$1:1:1: error: expected ';'" >&2; exit 1 ;;
  esac
  shift
done
mkdir -p "$(dirname "$out")"
echo object > "$out"
"#;

const FAKE_LIPO: &str = r#"#!/bin/sh
echo "lipo $*" >> "$LUZ_TEST_LOG"
out=""
while [ $# -gt 0 ]; do
  if [ "$1" = "-output" ]; then out="$2"; shift; fi
  shift
done
mkdir -p "$(dirname "$out")"
echo universal > "$out"
"#;

const FAKE_LOGGER: &str = r#"#!/bin/sh
echo "$(basename "$0") $*" >> "$LUZ_TEST_LOG"
"#;

const FAKE_DPKG_DEB: &str = r#"#!/bin/sh
echo "dpkg-deb $*" >> "$LUZ_TEST_LOG"
touch "$4"
"#;

/// Isolated project, storage and fake tool directory.
pub struct TestEnv {
  pub temp: TempDir,
}

impl TestEnv {
  pub fn new(project: &str) -> Self {
    let temp = TempDir::new().unwrap();
    let env = Self { temp };

    env.write_file("project/luz.toml", project);
    for dir in ["storage/vendor/headers", "storage/vendor/lib", "sdk/iPhoneOS.sdk"] {
      fs::create_dir_all(env.temp.path().join(dir)).unwrap();
    }
    for (name, script) in [
      ("clang", FAKE_CC),
      ("lipo", FAKE_LIPO),
      ("ldid", FAKE_LOGGER),
      ("install_name_tool", FAKE_LOGGER),
      ("strip", FAKE_LOGGER),
      ("dpkg-deb", FAKE_DPKG_DEB),
    ] {
      env.write_executable(&format!("bin/{}", name), script);
    }
    env
  }

  /// Write a file relative to the temp directory.
  pub fn write_file(&self, relative_path: &str, content: &str) {
    let path = self.temp.path().join(relative_path);
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
  }

  fn write_executable(&self, relative_path: &str, content: &str) {
    self.write_file(relative_path, content);
    let path = self.temp.path().join(relative_path);
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
  }

  pub fn project(&self) -> PathBuf {
    self.temp.path().join("project")
  }

  pub fn tool_log(&self) -> String {
    fs::read_to_string(self.temp.path().join("tools.log")).unwrap_or_default()
  }

  /// `luz build` over the project with the fake tools first on `PATH`.
  pub fn build_cmd(&self) -> Command {
    let mut cmd = cargo_bin_cmd!("luz");
    let path = format!("{}:/usr/bin:/bin", self.temp.path().join("bin").display());
    cmd
      .env("PATH", path)
      .env("LUZ_STORAGE", self.temp.path().join("storage"))
      .env("LUZ_TEST_LOG", self.temp.path().join("tools.log"))
      .env_remove("RUST_LOG")
      .arg("build")
      .arg("-p")
      .arg(self.project())
      .arg("-m")
      .arg(format!("sdk={}", self.temp.path().join("sdk/iPhoneOS.sdk").display()));
    cmd
  }
}
