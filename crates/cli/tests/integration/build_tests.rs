//! Build command integration tests.

use std::fs;

use predicates::prelude::*;

use super::common::TestEnv;

const TOOL_PROJECT: &str = r#"
[control]
id = "com.example.hello"
version = "1.0.0"
architecture = "iphoneos-arm64"
maintainer = "Example <dev@example.com>"

[[modules]]
name = "hello"
type = "tool"
files = ["main.m", "util.m"]
"#;

fn tool_env() -> TestEnv {
  let env = TestEnv::new(TOOL_PROJECT);
  env.write_file("project/main.m", "int main(void) { return 0; }\n");
  env.write_file("project/util.m", "void util(void) {}\n");
  env
}

#[test]
fn build_compiles_links_and_packs() {
  let env = tool_env();

  env
    .build_cmd()
    .assert()
    .success()
    .stdout(predicate::str::contains("[HEL] Compiling main.m"))
    .stdout(predicate::str::contains("Package"));

  let package = env
    .project()
    .join("packages/com.example.hello_1.0.0-1+debug_iphoneos-arm64.deb");
  assert!(package.exists());
  assert!(env.project().join(".luz/_/var/jb/usr/local/bin/hello").exists());
  assert!(env.project().join(".luz/hashlist.json").exists());

  let log = env.tool_log();
  assert_eq!(log.lines().filter(|l| l.starts_with("cc ") && l.contains(" -c ")).count(), 4);
  assert!(log.contains("dpkg-deb -Zxz --build"));
  let rpath = log.find("install_name_tool").unwrap();
  let sign = log.find("ldid").unwrap();
  assert!(rpath < sign);
}

#[test]
fn second_build_has_nothing_to_compile() {
  let env = tool_env();
  env.build_cmd().assert().success();

  env
    .build_cmd()
    .assert()
    .success()
    .stdout(predicate::str::contains("[HEL] Nothing to compile"));
  assert!(
    env
      .project()
      .join("packages/com.example.hello_1.0.0-2+debug_iphoneos-arm64.deb")
      .exists()
  );
}

#[test]
fn clean_rebuilds_everything() {
  let env = tool_env();
  env.build_cmd().assert().success();

  env
    .build_cmd()
    .arg("--clean")
    .assert()
    .success()
    .stdout(predicate::str::contains("[HEL] Compiling util.m"));

  let list = fs::read_to_string(env.project().join(".luz/hashlist.json")).unwrap();
  assert!(list.contains("\"build_number\": 1"));
}

#[test]
fn meta_override_selects_archs_and_release() {
  let env = tool_env();

  env
    .build_cmd()
    .args(["-m", "archs=[arm64]", "-m", "release=true"])
    .assert()
    .success();

  let log = env.tool_log();
  assert_eq!(log.lines().filter(|l| l.starts_with("cc ") && l.contains(" -c ")).count(), 2);
  assert!(log.lines().any(|l| l.starts_with("strip ")));
  assert!(env.project().join("packages/com.example.hello_1.0.0_iphoneos-arm64.deb").exists());
}

#[test]
fn compile_error_fails_without_package() {
  let env = TestEnv::new(&TOOL_PROJECT.replace("util.m", "Broken.m"));
  env.write_file("project/main.m", "int main(void) { return 0; }\n");
  env.write_file("project/Broken.m", "void broken(void) {}\n");

  env
    .build_cmd()
    .assert()
    .failure()
    .code(1)
    .stderr(predicate::str::contains("module \"hello\""))
    .stderr(predicate::str::contains("Broken.m"));

  assert!(!env.project().join("packages").exists());
  assert!(env.project().join(".luz/hashlist.json").exists());
}

#[test]
fn missing_tool_fails_before_compiling() {
  let env = tool_env();
  fs::remove_file(env.temp.path().join("bin/ldid")).unwrap();

  env
    .build_cmd()
    .assert()
    .failure()
    .stderr(predicate::str::contains("ldid"));
  assert!(!env.tool_log().contains("cc "));
}
