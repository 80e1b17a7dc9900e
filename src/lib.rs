// Inference deck - settings model, derived path sync and run history diffing
#![allow(clippy::needless_return)]

pub mod catalog;
pub mod cli;
mod constants;
pub mod defaults;
pub mod derived;
pub mod diff;
pub mod engine;
pub mod errors;
pub mod fields;
pub mod history;
pub mod models;
pub mod paths;
pub mod runner;
pub mod sanitize;
pub mod state;
pub mod validation;
mod util;

pub use catalog::SliceKind;
pub use derived::{compute_derived, reconcile_on_edit};
pub use diff::{clean_text, DiffEngine, DiffField, DiffResult, DiffWorkflow, HtmlDiffEngine};
pub use errors::{AppError, ErrorEvent};
pub use fields::{Field, FieldKind, FieldValue};
pub use history::{SelectionWindow, WorkItem, WorkItemStore};
pub use models::{ModelDescriptor, ModelLister};
pub use runner::{CommandRunner, InferenceSession, ProcessRunner};
pub use sanitize::{HtmlSanitizer, InlineHtmlSanitizer, SanitizeProfile};
pub use state::{AppState, SettingsCommand, SettingsSlice, SettingsStore};
pub use util::normalize_separators;

use clap::Parser;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;

fn open_log_file(path: &Path) -> Option<File> {
  if let Some(parent) = path.parent() {
    let _ = fs::create_dir_all(parent);
  }
  // Truncated on every start.
  match File::create(path) {
    Ok(file) => Some(file),
    Err(err) => {
      eprintln!("Cannot open log file {}: {}", path.display(), err);
      None
    }
  }
}

/// Console logging plus an optional plain-text log file. Keep the returned
/// guard alive until exit so the file gets flushed.
pub fn init_logging(log_file: Option<PathBuf>) -> Option<WorkerGuard> {
  use tracing_subscriber::{fmt, prelude::*, EnvFilter};

  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

  let console = fmt::layer()
    .with_writer(std::io::stderr)
    .with_target(false)
    .with_thread_ids(false)
    .with_file(true)
    .with_line_number(true);

  let (file_layer, guard) = match log_file.as_deref().and_then(open_log_file) {
    Some(file) => {
      let (writer, guard) = tracing_appender::non_blocking(file);
      let layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(false)
        .with_file(true)
        .with_line_number(true);
      (Some(layer), Some(guard))
    }
    None => (None, None),
  };

  let _ = tracing_subscriber::registry()
    .with(filter)
    .with(console)
    .with(file_layer)
    .try_init();

  if let Some(path) = &log_file {
    info!("Logging to {}", path.display());
  }
  guard
}

pub fn run() -> Result<(), AppError> {
  let args = cli::Cli::parse();
  let _guard = init_logging(args.log_file.clone());

  info!("Starting inference deck");
  let stdout = std::io::stdout();
  let mut out = stdout.lock();
  cli::execute(&args, &mut out)
}
