//! User-facing progress events.

use std::path::PathBuf;
use std::time::Duration;

use tracing::{error, info, warn};

/// Something a user watching the build wants to see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildEvent {
  /// A project (or submodule) started building.
  Project { name: String },
  Compiling { module: String, file: PathBuf },
  NothingToCompile { module: String },
  Linking { module: String, output: String },
  Staging { module: String },
  /// Something surprising that does not stop the build.
  Caution { module: Option<String>, message: String },
  ModuleFailed { module: String, error: String },
  ModuleDone { module: String, elapsed: Duration },
  Fetching { what: String },
  Packing { output: PathBuf },
}

/// Receives [`BuildEvent`]s.
///
/// Calls are serialized by the session, so implementations may write
/// multi-line output without interleaving.
pub trait Reporter: Send + Sync {
  fn report(&self, event: &BuildEvent);
}

/// Forwards events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
  fn report(&self, event: &BuildEvent) {
    match event {
      BuildEvent::Project { name } => info!(project = %name, "building"),
      BuildEvent::Compiling { module, file } => info!(module = %module, file = %file.display(), "compiling"),
      BuildEvent::NothingToCompile { module } => info!(module = %module, "nothing to compile"),
      BuildEvent::Linking { module, output } => info!(module = %module, output = %output, "linking"),
      BuildEvent::Staging { module } => info!(module = %module, "staging"),
      BuildEvent::Caution { module, message } => warn!(module = ?module, "{}", message),
      BuildEvent::ModuleFailed { module, error } => error!(module = %module, error = %error, "module failed"),
      BuildEvent::ModuleDone { module, elapsed } => info!(module = %module, elapsed = ?elapsed, "module done"),
      BuildEvent::Fetching { what } => info!(what = %what, "fetching"),
      BuildEvent::Packing { output } => info!(output = %output.display(), "packing"),
    }
  }
}
