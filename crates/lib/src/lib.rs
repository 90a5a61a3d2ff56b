//! luz-lib: incremental builds for jailbreak packages
//!
//! This crate holds everything the `luz` binary drives:
//! - `config`: `luz.toml` loading, meta resolution, module declarations
//! - `session`: the hash list, worker pool and progress reporting for one build
//! - `build`: the per-module hash, compile, link, stage pipeline
//! - `project`: whole-tree builds with submodules, and packing
//! - `toolchain`: the seam to the native compiler, linker and signer

pub mod build;
pub mod config;
pub mod consts;
pub mod flags;
pub mod platform;
pub mod project;
pub mod session;
pub mod toolchain;
pub mod util;
pub mod vendor;
