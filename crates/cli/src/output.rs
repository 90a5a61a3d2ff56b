//! CLI output formatting.
//!
//! Colored status lines and the console [`Reporter`] that renders build
//! progress, each line tagged with the module's abbreviation.

use std::time::Duration;

use owo_colors::{OwoColorize, Stream};

use luz_lib::config::module::abbreviate;
use luz_lib::session::{BuildEvent, Reporter};

pub mod symbols {
  pub const SUCCESS: &str = "✓";
  pub const ERROR: &str = "✗";
  pub const WARNING: &str = "⚠";
  pub const INFO: &str = "•";
  pub const ARROW: &str = "→";
}

pub fn format_duration(duration: Duration) -> String {
  let secs = duration.as_secs();
  let millis = duration.subsec_millis();

  if secs >= 60 {
    let mins = secs / 60;
    let remaining_secs = secs % 60;
    format!("{}m {}s", mins, remaining_secs)
  } else if secs > 0 {
    format!("{}.{:02}s", secs, millis / 10)
  } else {
    format!("{}ms", millis)
  }
}

pub fn print_success(message: &str) {
  println!(
    "{} {}",
    symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()),
    message
  );
}

pub fn print_error(message: &str) {
  eprintln!(
    "{} {}",
    symbols::ERROR.if_supports_color(Stream::Stderr, |s| s.red()),
    message.if_supports_color(Stream::Stderr, |s| s.red())
  );
}

pub fn print_warning(message: &str) {
  eprintln!(
    "{} {}",
    symbols::WARNING.if_supports_color(Stream::Stderr, |s| s.yellow()),
    message.if_supports_color(Stream::Stderr, |s| s.yellow())
  );
}

pub fn print_info(message: &str) {
  println!(
    "{} {}",
    symbols::INFO.if_supports_color(Stream::Stdout, |s| s.blue()),
    message
  );
}

pub fn print_stat(label: &str, value: &str) {
  println!("  {}: {}", label.if_supports_color(Stream::Stdout, |s| s.dimmed()), value);
}

fn tag(module: &str) -> String {
  format!("[{}]", abbreviate(module))
}

/// Renders [`BuildEvent`]s on the terminal.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleReporter;

impl ConsoleReporter {
  /// The line printed for `event`, without color.
  pub fn line(event: &BuildEvent) -> String {
    match event {
      BuildEvent::Project { name } => format!("Building {}", name),
      BuildEvent::Compiling { module, file } => {
        let name = file.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
        format!("{} Compiling {}", tag(module), name)
      }
      BuildEvent::NothingToCompile { module } => format!("{} Nothing to compile", tag(module)),
      BuildEvent::Linking { module, output } => format!("{} Linking {}", tag(module), output),
      BuildEvent::Staging { module } => format!("{} Staging", tag(module)),
      BuildEvent::Caution { module: Some(module), message } => format!("{} {}", tag(module), message),
      BuildEvent::Caution { module: None, message } => message.clone(),
      BuildEvent::ModuleFailed { module, error } => format!("{} {}", tag(module), error),
      BuildEvent::ModuleDone { module, elapsed } => {
        format!("{} Done in {}", tag(module), format_duration(*elapsed))
      }
      BuildEvent::Fetching { what } => format!("Fetching {}", what),
      BuildEvent::Packing { output } => format!("Packing {} {}", symbols::ARROW, output.display()),
    }
  }
}

impl Reporter for ConsoleReporter {
  fn report(&self, event: &BuildEvent) {
    let line = Self::line(event);
    match event {
      BuildEvent::Caution { .. } => print_warning(&line),
      BuildEvent::ModuleFailed { .. } => print_error(&line),
      BuildEvent::ModuleDone { .. } => print_success(&line),
      BuildEvent::Project { .. } | BuildEvent::Fetching { .. } | BuildEvent::Packing { .. } => print_info(&line),
      _ => println!("{}", line),
    }
  }
}
