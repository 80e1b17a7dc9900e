use crate::catalog::SliceKind;
use crate::constants::{DEFAULTS_FILE_NAME, HISTORY_FILE_NAME};
use crate::defaults::{DefaultSettingsLoader, EnvDefaultsLoader, JsonDefaultsLoader};
use crate::diff::{DiffField, DiffWorkflow, HtmlDiffEngine};
use crate::engine::{form, restore_model, revalidate, EngineKind};
use crate::errors::AppError;
use crate::history::{JsonWorkItemStore, SelectionWindow, WorkItemStore};
use crate::models::{describe, DirectoryModelLister, ModelDescriptor, ModelFile, ModelLister};
use crate::paths::{resolve_config_path, resolve_data_path, resolve_models_dir};
use crate::sanitize::InlineHtmlSanitizer;
use crate::state::AppState;
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(
  name = "inference-deck",
  about = "Inspect engine settings and compare past inference runs",
  long_about = None,
)]
pub struct Cli {
  /// Default settings file (JSON)
  #[arg(long, global = true, env = "INFERENCE_DECK_DEFAULTS")]
  pub defaults: Option<PathBuf>,

  /// History file (JSON array of runs)
  #[arg(long, global = true, env = "INFERENCE_DECK_HISTORY")]
  pub history: Option<PathBuf>,

  /// Folder to scan for model files
  #[arg(long, global = true, env = "INFERENCE_DECK_MODEL_DIR")]
  pub model_dir: Option<PathBuf>,

  /// Also write logs to this file
  #[arg(long, global = true, env = "INFERENCE_DECK_LOG_FILE")]
  pub log_file: Option<PathBuf>,

  #[command(subcommand)]
  pub command: CliCommand,
}

#[derive(Subcommand, Debug)]
pub enum CliCommand {
  /// List model files
  Models,

  /// Print a settings slice as flat JSON
  Show {
    /// primary | embedding | app
    slice: SliceKind,
  },

  /// Print validation errors for both engines
  Validate,

  /// Compare two history records
  Diff {
    left: i64,
    right: i64,
    /// prompt | completion | args
    #[arg(long, default_value = "completion")]
    field: DiffField,
  },
}

fn defaults_loader(cli: &Cli) -> Box<dyn DefaultSettingsLoader> {
  let path = cli
    .defaults
    .clone()
    .unwrap_or_else(|| resolve_config_path(DEFAULTS_FILE_NAME));
  if path.exists() {
    Box::new(JsonDefaultsLoader::new(path))
  } else {
    info!("No defaults file at {}, reading the environment", path.display());
    Box::new(EnvDefaultsLoader::new())
  }
}

fn load_state(cli: &Cli) -> Result<AppState, AppError> {
  let mut state = AppState::new();
  state.initialize(defaults_loader(cli).as_ref())?;
  Ok(state)
}

fn model_lister(cli: &Cli, state: &AppState) -> Result<DirectoryModelLister, AppError> {
  if let Some(dir) = &cli.model_dir {
    return Ok(DirectoryModelLister::new(dir));
  }
  let configured = state.app_paths.text("ModelPath")?;
  resolve_models_dir(configured)
    .map(DirectoryModelLister::new)
    .ok_or_else(|| AppError::Model("no model folder configured".to_string()))
}

fn list_models(cli: &Cli, state: &AppState) -> Result<Vec<ModelFile>, AppError> {
  model_lister(cli, state)?.list()
}

/// Model list for restoring selections. A missing folder only means nothing
/// can be restored.
fn descriptors_or_empty(cli: &Cli, state: &AppState) -> Vec<ModelDescriptor> {
  match list_models(cli, state) {
    Ok(files) => describe(&files),
    Err(err) => {
      error!("Model list unavailable: {}", err);
      Vec::new()
    }
  }
}

fn write_line(out: &mut dyn Write, line: &str) -> Result<(), AppError> {
  writeln!(out, "{line}").map_err(|e| AppError::Other(format!("write failed: {e}")))
}

pub fn execute(cli: &Cli, out: &mut dyn Write) -> Result<(), AppError> {
  match &cli.command {
    CliCommand::Models => {
      let state = load_state(cli)?;
      for model in list_models(cli, &state)? {
        write_line(out, &format!("{}\t{} MB\t{}", model.file_name, model.size_mb, model.full_path))?;
      }
      Ok(())
    }
    CliCommand::Show { slice } => {
      let mut state = load_state(cli)?;
      let models = descriptors_or_empty(cli, &state);
      for kind in EngineKind::ALL {
        restore_model(&mut state, kind, &models)?;
      }
      let raw = state.store(*slice).to_raw()?;
      let json = serde_json::to_string_pretty(&raw)
        .map_err(|e| AppError::Other(format!("cannot encode settings: {e}")))?;
      write_line(out, &json)
    }
    CliCommand::Validate => {
      let mut state = load_state(cli)?;
      let models = descriptors_or_empty(cli, &state);
      let mut invalid = Vec::new();
      for kind in EngineKind::ALL {
        restore_model(&mut state, kind, &models)?;
        revalidate(&mut state, kind)?;
        let report = &form(&state, kind).validation;
        let label = kind.profile().slice.label();
        if report.is_valid() {
          write_line(out, &format!("{label}: ok"))?;
        } else {
          for (field, message) in &report.errors {
            write_line(out, &format!("{label}: {field}: {message}"))?;
          }
          invalid.push(label);
        }
      }
      if invalid.is_empty() {
        Ok(())
      } else {
        Err(AppError::Validation(format!("invalid settings: {}", invalid.join(", "))))
      }
    }
    CliCommand::Diff { left, right, field } => {
      let path = cli
        .history
        .clone()
        .unwrap_or_else(|| resolve_data_path(HISTORY_FILE_NAME));
      let items = JsonWorkItemStore::new(path).list()?;

      let mut window = SelectionWindow::new();
      window.toggle(*left);
      window.toggle(*right);

      let mut workflow = DiffWorkflow::new();
      workflow.field = *field;
      workflow.run_blocking(&window, &items, &HtmlDiffEngine, &InlineHtmlSanitizer)?;
      if let Some(result) = workflow.result() {
        write_line(out, &format!("[{}] {}", result.left_idx, result.left_text))?;
        write_line(out, &format!("[{}] {}", result.right_idx, result.right_text))?;
        write_line(out, &result.html)?;
      }
      Ok(())
    }
  }
}
