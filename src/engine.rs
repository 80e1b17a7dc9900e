// Engine profiles
//
// Both engine slices are driven the same way: a model picker writes the model
// path and its log file, derived path fields follow an app-paths folder, and
// every edit re-runs validation. The profile names the fields each engine
// uses for these roles.

use crate::catalog::SliceKind;
use crate::derived::{reconcile_on_edit, DerivedBinding};
use crate::errors::{log_failure, AppError};
use crate::fields::FieldValue;
use crate::models::{initialize_from_persisted, resolve_selection, ModelDescriptor, ModelResolution, PersistedModel};
use crate::state::{AppState, FormState, SettingsSlice};
use crate::validation::{validate, ValidationReport};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
  Primary,
  Embedding,
}

impl EngineKind {
  pub const ALL: [EngineKind; 2] = [EngineKind::Primary, EngineKind::Embedding];

  pub fn profile(self) -> &'static EngineProfile {
    match self {
      EngineKind::Primary => &PRIMARY,
      EngineKind::Embedding => &EMBEDDING,
    }
  }
}

#[derive(Debug, Clone, Copy)]
pub struct EngineProfile {
  pub kind: EngineKind,
  pub slice: SliceKind,
  /// Model path field in the engine slice.
  pub model_field: &'static str,
  /// Model log file field in the engine slice.
  pub log_field: &'static str,
  /// App-paths field holding a persisted full model path.
  pub app_full_path: &'static str,
  /// App-paths field holding the persisted model file name.
  pub app_file_name: &'static str,
  /// App-paths field holding the engine binary.
  pub binary_field: &'static str,
  /// App-paths folder used for the log file when the user picks a model.
  pub select_log_folder: &'static str,
  /// App-paths folder used for the log file when restoring on first load.
  pub restore_log_folder: &'static str,
  pub derived: &'static [DerivedBinding],
}

pub const PRIMARY: EngineProfile = EngineProfile {
  kind: EngineKind::Primary,
  slice: SliceKind::PrimaryEngine,
  model_field: "ModelFullPath",
  log_field: "ModelLogFileName",
  app_full_path: "ModelFullPathVal",
  app_file_name: "ModelFileName",
  binary_field: "LLamaCliPath",
  select_log_folder: "ModelLogPath",
  restore_log_folder: "AppLogPath",
  derived: &[
    DerivedBinding {
      field: "ModelLogFileName",
      base_folder: "ModelLogPath",
    },
    DerivedBinding {
      field: "PromptCache",
      base_folder: "PromptCachePath",
    },
  ],
};

pub const EMBEDDING: EngineProfile = EngineProfile {
  kind: EngineKind::Embedding,
  slice: SliceKind::EmbeddingEngine,
  model_field: "EmbedModelFullPath",
  log_field: "EmbedModelLogFileName",
  app_full_path: "EmbedModelFullPathVal",
  app_file_name: "EmbedModelFileName",
  binary_field: "LLamaEmbedCliPath",
  select_log_folder: "ModelLogPath",
  restore_log_folder: "AppLogPath",
  derived: &[DerivedBinding {
    field: "EmbedModelLogFileName",
    base_folder: "ModelLogPath",
  }],
};

impl EngineProfile {
  pub fn binding(&self, field: &str) -> Option<&'static DerivedBinding> {
    self.derived.iter().find(|binding| binding.field == field)
  }
}

fn form_mut(state: &mut AppState, kind: EngineKind) -> &mut FormState {
  match kind {
    EngineKind::Primary => &mut state.primary_form,
    EngineKind::Embedding => &mut state.embedding_form,
  }
}

pub fn form(state: &AppState, kind: EngineKind) -> &FormState {
  match kind {
    EngineKind::Primary => &state.primary_form,
    EngineKind::Embedding => &state.embedding_form,
  }
}

fn apply_resolution(
  state: &mut AppState,
  profile: &EngineProfile,
  resolution: &ModelResolution,
) -> Result<(), AppError> {
  let store = state.store_mut(profile.slice);
  store.set_value(profile.model_field, resolution.full_path.as_str())?;
  store.set_value(profile.log_field, resolution.log_file_name.as_str())?;
  form_mut(state, profile.kind).selected_model = Some(resolution.id.clone());
  Ok(())
}

/// The user picked a model. Returns `false` when the id is not in `models`,
/// in which case nothing changes.
pub fn select_model(
  state: &mut AppState,
  kind: EngineKind,
  selected_id: &str,
  models: &[ModelDescriptor],
) -> Result<bool, AppError> {
  let profile = kind.profile();
  let log_folder = state.app_paths.text(profile.select_log_folder)?.to_string();
  let Some(resolution) = resolve_selection(selected_id, models, &log_folder) else {
    return Ok(false);
  };
  apply_resolution(state, profile, &resolution)?;
  revalidate(state, kind)?;
  info!("Selected model {}", resolution.id);
  Ok(true)
}

/// Restore the saved model selection on first load.
pub fn restore_model(
  state: &mut AppState,
  kind: EngineKind,
  models: &[ModelDescriptor],
) -> Result<Option<ModelResolution>, AppError> {
  let profile = kind.profile();
  let mut full_path = state.store(profile.slice).text(profile.model_field)?.to_string();

  if full_path.trim().is_empty() {
    let app_full_path = state.app_paths.text(profile.app_full_path)?.to_string();
    if !app_full_path.trim().is_empty() {
      state
        .store_mut(profile.slice)
        .set_value(profile.model_field, app_full_path.as_str())?;
      full_path = app_full_path;
    }
  }

  let persisted = PersistedModel {
    full_path,
    folder: state.app_paths.text("ModelPath")?.to_string(),
    file_name: state.app_paths.text(profile.app_file_name)?.to_string(),
  };
  let log_folder = state.app_paths.text(profile.restore_log_folder)?.to_string();

  let resolution = initialize_from_persisted(&persisted, models, &log_folder);
  match &resolution {
    Some(resolution) => apply_resolution(state, profile, resolution)?,
    None => debug!("Saved {:?} model {} is not listed", kind, persisted.expected_id()),
  }
  revalidate(state, kind)?;
  Ok(resolution)
}

/// User edit of a derived path field. Returns the value written.
pub fn edit_derived(
  state: &mut AppState,
  kind: EngineKind,
  field: &str,
  input: &str,
) -> Result<String, AppError> {
  let profile = kind.profile();
  let binding = log_failure(
    profile
      .binding(field)
      .ok_or_else(|| AppError::UnsupportedUpdate(format!("{field} is not a derived field"))),
    "Derived edit rejected",
  )?;
  let base = state.app_paths.text(binding.base_folder)?.to_string();
  let value = reconcile_on_edit(&base, input);
  state.store_mut(profile.slice).set_value(field, value.as_str())?;
  revalidate(state, kind)?;
  Ok(value)
}

/// Any other edit in an engine form.
pub fn edit_field(
  state: &mut AppState,
  kind: EngineKind,
  name: &str,
  value: impl Into<FieldValue>,
) -> Result<(), AppError> {
  let profile = kind.profile();
  if profile.binding(name).is_some() {
    if let FieldValue::Text(text) = value.into() {
      edit_derived(state, kind, name, &text)?;
      return Ok(());
    }
    return log_failure(
      Err(AppError::UnsupportedUpdate(format!("{name} holds text"))),
      "Field edit rejected",
    );
  }
  state.store_mut(profile.slice).set_value(name, value)?;
  revalidate(state, kind)?;
  Ok(())
}

pub fn revalidate(state: &mut AppState, kind: EngineKind) -> Result<&ValidationReport, AppError> {
  let profile = kind.profile();
  let report = validate(profile.slice, state.store(profile.slice).slice()?);
  let form = form_mut(state, kind);
  form.validation = report;
  Ok(&form.validation)
}

/// The slice to hand to the runner, or `Validation` while any field is invalid.
pub fn prepare_submission(state: &mut AppState, kind: EngineKind) -> Result<SettingsSlice, AppError> {
  let report = revalidate(state, kind)?;
  if !report.is_valid() {
    let summary = report.summary();
    warn!("Submission blocked: {}", summary);
    return Err(AppError::Validation(summary));
  }
  Ok(state.store(kind.profile().slice).slice()?.clone())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::defaults::RawSettings;
  use crate::models::{describe, ModelFile};
  use crate::util::capture_logs;
  use serde_json::json;

  fn state_with(app: serde_json::Value, primary: serde_json::Value) -> AppState {
    let mut state = AppState::new();
    let raw = RawSettings {
      primary_engine: primary.as_object().cloned().unwrap(),
      embedding_engine: serde_json::Map::new(),
      app_paths: app.as_object().cloned().unwrap(),
    };
    for kind in SliceKind::ALL {
      state.store_mut(kind).init_from_defaults(raw.for_slice(kind)).unwrap();
    }
    state
  }

  fn models() -> Vec<ModelDescriptor> {
    describe(&[ModelFile {
      file_name: "llama-7b.gguf".to_string(),
      full_path: r"D:\models\llama-7b.gguf".to_string(),
      size_mb: 0,
    }])
  }

  #[test]
  fn test_select_model_writes_path_and_log() {
    let mut state = state_with(
      json!({ "ModelLogPath": "/models/logs/", "AppLogPath": "/app/" }),
      json!({ "ModelCmd": "-m", "ModelLogFileCmd": "--log-file" }),
    );
    assert!(select_model(&mut state, EngineKind::Primary, "D:/models/llama-7b.gguf", &models()).unwrap());

    let model = state.primary.get("ModelFullPath").unwrap();
    assert_eq!(model.text(), Some("D:/models/llama-7b.gguf"));
    assert_eq!(model.cmd_token(), Some("-m"));
    assert_eq!(
      state.primary.text("ModelLogFileName").unwrap(),
      "/models/logs/llama-7b.gguf.log"
    );
    assert_eq!(
      form(&state, EngineKind::Primary).selected_model.as_deref(),
      Some("D:/models/llama-7b.gguf")
    );
  }

  #[test]
  fn test_select_unknown_model_is_noop() {
    let mut state = state_with(json!({}), json!({}));
    let before = state.primary.slice().unwrap().clone();
    assert!(!select_model(&mut state, EngineKind::Primary, "/x.gguf", &models()).unwrap());
    assert_eq!(state.primary.slice().unwrap(), &before);
  }

  #[test]
  fn test_restore_uses_app_log_folder() {
    let mut state = state_with(
      json!({ "ModelPath": r"D:\models\", "ModelFileName": "llama-7b.gguf", "AppLogPath": "/app/logs/" }),
      json!({}),
    );
    let res = restore_model(&mut state, EngineKind::Primary, &models()).unwrap().unwrap();
    assert_eq!(res.log_file_name, "/app/logs/llama-7b.gguf.log");
    assert_eq!(state.primary.text("ModelFullPath").unwrap(), "D:/models/llama-7b.gguf");
  }

  #[test]
  fn test_restore_copies_app_full_path() {
    let mut state = state_with(json!({ "EmbedModelFullPathVal": "/e/embed.gguf" }), json!({}));
    let res = restore_model(&mut state, EngineKind::Embedding, &[]).unwrap();
    assert!(res.is_none());
    assert_eq!(state.embedding.text("EmbedModelFullPath").unwrap(), "/e/embed.gguf");
  }

  #[test]
  fn test_edit_derived_keeps_base_folder() {
    let mut state = state_with(json!({ "PromptCachePath": "/cache/" }), json!({}));
    let value = edit_derived(&mut state, EngineKind::Primary, "PromptCache", "/cXche/run.bin").unwrap();
    assert_eq!(value, "/cache/run.bin");
    assert_eq!(state.primary.text("PromptCache").unwrap(), "/cache/run.bin");

    let err = edit_derived(&mut state, EngineKind::Primary, "TopK", "40").unwrap_err();
    assert!(matches!(err, AppError::UnsupportedUpdate(_)));
  }

  #[test]
  fn test_rejected_edits_are_logged() {
    let mut state = state_with(json!({}), json!({}));
    let logs = capture_logs(|| {
      assert!(edit_derived(&mut state, EngineKind::Primary, "TopK", "40").is_err());
      assert!(edit_field(&mut state, EngineKind::Primary, "PromptCache", FieldValue::Enabled(true)).is_err());
      assert!(edit_field(&mut state, EngineKind::Embedding, "NoSuchField", "x").is_err());
    });
    assert!(logs.contains("Derived edit rejected: TopK is not a derived field"));
    assert!(logs.contains("Field edit rejected: PromptCache holds text"));
    assert!(logs.contains("Unknown Setting: Settings update rejected: NoSuchField"));
  }

  #[test]
  fn test_edit_field_revalidates() {
    let mut state = state_with(json!({}), json!({ "GPULayersCmd": "-ngl" }));
    edit_field(&mut state, EngineKind::Primary, "Description", "abc").unwrap();
    assert!(form(&state, EngineKind::Primary)
      .validation
      .error_for("Description")
      .is_some());

    edit_field(&mut state, EngineKind::Primary, "Description", "chat preset").unwrap();
    assert!(form(&state, EngineKind::Primary).validation.is_valid());
  }

  #[test]
  fn test_submission_blocked_while_invalid() {
    let mut state = state_with(json!({}), json!({}));
    let err = prepare_submission(&mut state, EngineKind::Primary).unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    edit_field(&mut state, EngineKind::Primary, "Description", "chat preset").unwrap();
    edit_field(&mut state, EngineKind::Primary, "GPULayersCmd", "-ngl").unwrap();
    let slice = prepare_submission(&mut state, EngineKind::Primary).unwrap();
    assert_eq!(slice.text("GPULayersCmd").unwrap(), "-ngl");
  }
}
