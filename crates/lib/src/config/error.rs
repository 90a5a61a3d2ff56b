use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Malformed or incomplete project declarations, detected before any compilation starts.
#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("project file not found: {0}")]
  NotFound(PathBuf),

  #[error("failed to read {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse {path}: {message}")]
  Parse { path: PathBuf, message: String },

  #[error("invalid value for `{key}`: {message}")]
  InvalidValue { key: String, message: String },

  #[error("missing required key `{0}`")]
  MissingKey(String),

  #[error("invalid meta override `{0}`, expected key=value")]
  InvalidOverride(String),

  #[error("unknown module type `{0}`")]
  UnknownKind(String),

  #[error("duplicate module name `{0}`")]
  DuplicateModule(String),

  #[error("module `{module}`: {message}")]
  Module { module: String, message: String },

  #[error("module `{module}`: file not found: {path}")]
  MissingFile { module: String, path: PathBuf },

  #[error("{tool} not found (looked for `{name}`)")]
  ToolNotFound { tool: &'static str, name: String },

  #[error("no SDK found for platform `{platform}`: {detail}")]
  SdkNotFound { platform: String, detail: String },

  #[error("invalid compression `{0}`, expected one of: xz, gzip, zstd, none")]
  InvalidCompression(String),

  #[error("control is missing required field `{0}`")]
  MissingControlField(&'static str),

  #[error("script `{kind}`: {message}")]
  Script { kind: String, message: String },

  #[error("submodule not found: {0}")]
  MissingSubmodule(PathBuf),
}
