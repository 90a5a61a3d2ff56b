//! Implementation of the `luz verify` command.

use std::path::Path;

use anyhow::{Result, bail};

use luz_lib::config::verify::{Severity, verify};

use crate::output::{print_error, print_info, print_success, print_warning};

pub fn cmd_verify(path: &Path) -> Result<()> {
  let report = verify(path);

  for finding in &report.findings {
    match finding.severity {
      Severity::Note => print_info(&finding.message),
      Severity::Warning => print_warning(&finding.message),
      Severity::Error => print_error(&finding.message),
    }
  }

  let summary = format!("{} warning(s), {} error(s)", report.warnings(), report.errors());
  if !report.is_ok() {
    bail!("Verification failed: {}", summary);
  }
  print_success(&summary);
  Ok(())
}
