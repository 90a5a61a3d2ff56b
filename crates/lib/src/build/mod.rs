//! The per-module build pipeline.
//!
//! A module moves through `Pending → Hashing → Compiling → Linking →
//! Staging → Done`, or to `Failed` at any step. Each stage is its own
//! submodule:
//!
//! - [`changeset`] - decides which sources need compiling
//! - [`preprocess`] - expands hook sources before compilation
//! - [`compile`] - per-architecture compile fan-out
//! - [`link`] - per-architecture link, merge, rpath, strip, sign
//! - [`stage`] - copies artifacts and resources into the package tree
//! - [`module`] - drives one module through the stages

pub mod changeset;
pub mod compile;
pub mod link;
pub mod module;
pub mod preprocess;
pub mod stage;
mod types;

pub use module::{ModuleContext, build_module};
pub use stage::StagingLayout;
pub use types::*;
