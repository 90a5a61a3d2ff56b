//! Project configuration: `luz.toml`, meta, modules and package metadata.

pub mod control;
pub mod error;
pub mod layers;
pub mod loader;
pub mod meta;
pub mod module;
pub mod verify;

pub use control::{Control, MaintainerScript};
pub use error::ConfigError;
pub use layers::Layers;
pub use loader::{ProjectConfig, Submodule};
pub use meta::{BuildMeta, Compression, ToolNames};
pub use module::{Filter, LinkOutput, ModuleKind, ModuleSpec};
