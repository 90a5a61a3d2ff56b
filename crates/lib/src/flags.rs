//! Structured compiler and linker flags.
//!
//! Flags are collected as typed records in an insertion-ordered set and only
//! rendered to an argument vector when a tool is invoked. Adding the same
//! include directory twice is a no-op instead of a duplicated `-I`.

use std::collections::HashSet;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Flag {
  Include(PathBuf),
  LibraryDir(PathBuf),
  FrameworkDir(PathBuf),
  Library(String),
  Framework(String),
  Define { key: String, value: Option<String> },
  /// Passed through untouched.
  Raw(String),
}

impl Flag {
  pub fn define(key: impl Into<String>, value: impl Into<String>) -> Self {
    Flag::Define {
      key: key.into(),
      value: Some(value.into()),
    }
  }

  pub fn raw(value: impl Into<String>) -> Self {
    Flag::Raw(value.into())
  }

  fn render_into(&self, out: &mut Vec<String>) {
    match self {
      Flag::Include(dir) => out.push(format!("-I{}", dir.display())),
      Flag::LibraryDir(dir) => out.push(format!("-L{}", dir.display())),
      Flag::FrameworkDir(dir) => out.push(format!("-F{}", dir.display())),
      Flag::Library(name) => out.push(format!("-l{}", name)),
      Flag::Framework(name) => {
        out.push("-framework".to_string());
        out.push(name.clone());
      }
      Flag::Define { key, value: Some(value) } => out.push(format!("-D{}={}", key, value)),
      Flag::Define { key, value: None } => out.push(format!("-D{}", key)),
      Flag::Raw(raw) => out.push(raw.clone()),
    }
  }
}

/// An insertion-ordered set of [`Flag`]s.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlagSet {
  flags: Vec<Flag>,
  seen: HashSet<Flag>,
}

impl FlagSet {
  pub fn new() -> Self {
    Self::default()
  }

  /// Insert a flag, returning false if it was already present.
  pub fn insert(&mut self, flag: Flag) -> bool {
    if !self.seen.insert(flag.clone()) {
      return false;
    }
    self.flags.push(flag);
    true
  }

  pub fn with(mut self, flag: Flag) -> Self {
    self.insert(flag);
    self
  }

  pub fn contains(&self, flag: &Flag) -> bool {
    self.seen.contains(flag)
  }

  pub fn len(&self) -> usize {
    self.flags.len()
  }

  pub fn is_empty(&self) -> bool {
    self.flags.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = &Flag> {
    self.flags.iter()
  }

  /// Render to an argument vector, in insertion order.
  pub fn to_args(&self) -> Vec<String> {
    let mut out = Vec::with_capacity(self.flags.len());
    for flag in &self.flags {
      flag.render_into(&mut out);
    }
    out
  }
}

impl Extend<Flag> for FlagSet {
  fn extend<I: IntoIterator<Item = Flag>>(&mut self, iter: I) {
    for flag in iter {
      self.insert(flag);
    }
  }
}

impl FromIterator<Flag> for FlagSet {
  fn from_iter<I: IntoIterator<Item = Flag>>(iter: I) -> Self {
    let mut set = FlagSet::new();
    set.extend(iter);
    set
  }
}

impl IntoIterator for FlagSet {
  type Item = Flag;
  type IntoIter = std::vec::IntoIter<Flag>;

  fn into_iter(self) -> Self::IntoIter {
    self.flags.into_iter()
  }
}

impl<'a> IntoIterator for &'a FlagSet {
  type Item = &'a Flag;
  type IntoIter = std::slice::Iter<'a, Flag>;

  fn into_iter(self) -> Self::IntoIter {
    self.flags.iter()
  }
}
