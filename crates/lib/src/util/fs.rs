//! Filesystem helpers shared by the build stages.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// Recursively copy the contents of `src` into `dst`, creating directories as
/// needed and overwriting existing files. Top-level entries named in `skip`
/// are left out.
pub fn copy_tree(src: &Path, dst: &Path, skip: &[&str]) -> io::Result<()> {
  fs::create_dir_all(dst)?;
  let walker = WalkDir::new(src).min_depth(1).into_iter().filter_entry(|entry| {
    entry.depth() != 1 || !skip.iter().any(|s| entry.file_name() == *s)
  });

  for entry in walker {
    let entry = entry.map_err(io::Error::other)?;
    let relative = entry.path().strip_prefix(src).map_err(io::Error::other)?;
    let target = dst.join(relative);
    if entry.file_type().is_dir() {
      fs::create_dir_all(&target)?;
    } else {
      if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
      }
      fs::copy(entry.path(), &target)?;
    }
  }
  Ok(())
}

/// Whether `name` is an output of `basename` from some session:
/// `<basename>-<digits>` followed by an extension.
pub fn is_output_of(name: &str, basename: &str) -> bool {
  let Some(rest) = name.strip_prefix(basename).and_then(|r| r.strip_prefix('-')) else {
    return false;
  };
  let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
  digits > 0 && rest[digits..].starts_with('.')
}

/// Entries of `dir` that are outputs of `basename`. A missing directory has none.
pub fn outputs_of(dir: &Path, basename: &str) -> Vec<PathBuf> {
  let Ok(entries) = fs::read_dir(dir) else {
    return Vec::new();
  };
  let mut found: Vec<PathBuf> = entries
    .filter_map(|e| e.ok())
    .filter(|e| is_output_of(&e.file_name().to_string_lossy(), basename))
    .map(|e| e.path())
    .collect();
  found.sort();
  found
}

/// Remove a file or directory tree if it exists.
pub fn remove_if_exists(path: &Path) -> io::Result<()> {
  let result = if path.is_dir() { fs::remove_dir_all(path) } else { fs::remove_file(path) };
  match result {
    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
    other => other,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  #[test]
  fn output_names() {
    assert!(is_output_of("Tweak.x-1700000000000.o", "Tweak.x"));
    assert!(is_output_of("main.swift-17.swiftmodule", "main.swift"));
    assert!(!is_output_of("Tweak.x-other.m-17.o", "Tweak.x"));
    assert!(!is_output_of("Tweak.x-.o", "Tweak.x"));
    assert!(!is_output_of("Tweak.xm-17.o", "Tweak.x"));
  }

  #[test]
  fn copy_tree_merges_and_skips() {
    let temp = TempDir::new().unwrap();
    let src = temp.path().join("layout");
    fs::create_dir_all(src.join("Library/Application Support")).unwrap();
    fs::create_dir_all(src.join("DEBIAN")).unwrap();
    fs::write(src.join("Library/Application Support/a.txt"), "a").unwrap();
    fs::write(src.join("DEBIAN/control"), "Package: x").unwrap();

    let dst = temp.path().join("stage");
    fs::create_dir_all(dst.join("Library")).unwrap();
    fs::write(dst.join("Library/existing"), "keep").unwrap();

    copy_tree(&src, &dst, &["DEBIAN"]).unwrap();
    assert_eq!(fs::read_to_string(dst.join("Library/Application Support/a.txt")).unwrap(), "a");
    assert!(dst.join("Library/existing").exists());
    assert!(!dst.join("DEBIAN").exists());
  }

  #[test]
  fn outputs_of_lists_matching_files() {
    let temp = TempDir::new().unwrap();
    for name in ["a.m-1.o", "a.m-2.o", "b.m-1.o"] {
      fs::write(temp.path().join(name), "").unwrap();
    }
    assert_eq!(outputs_of(temp.path(), "a.m").len(), 2);
    assert!(outputs_of(&temp.path().join("missing"), "a.m").is_empty());
  }
}
