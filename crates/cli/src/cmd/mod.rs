mod build;
mod verify;

pub use build::cmd_build;
pub use verify::cmd_verify;
