use crate::catalog::{decode_present, decode_slice, SliceKind};
use crate::defaults::{DefaultSettingsLoader, RawSettings};
use crate::errors::{log_failure, report_error, AppError, ErrorEvent};
use crate::fields::{Field, FieldValue};
use crate::validation::ValidationReport;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use tracing::{info, warn};

/// One named collection of configuration fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsSlice {
  fields: HashMap<String, Field>,
}

impl SettingsSlice {
  pub fn from_fields(fields: impl IntoIterator<Item = Field>) -> Self {
    Self {
      fields: fields
        .into_iter()
        .map(|field| (field.name().to_string(), field))
        .collect(),
    }
  }

  pub fn len(&self) -> usize {
    self.fields.len()
  }

  pub fn is_empty(&self) -> bool {
    self.fields.is_empty()
  }

  pub fn contains(&self, name: &str) -> bool {
    self.fields.contains_key(name)
  }

  pub fn get(&self, name: &str) -> Result<&Field, AppError> {
    self
      .fields
      .get(name)
      .ok_or_else(|| AppError::UnknownField(name.to_string()))
  }

  /// Text of a plain or flag/value field, "" for toggles.
  pub fn text(&self, name: &str) -> Result<&str, AppError> {
    Ok(self.get(name)?.text().unwrap_or(""))
  }

  pub fn set_value(&mut self, name: &str, value: FieldValue) -> Result<(), AppError> {
    self
      .fields
      .get_mut(name)
      .ok_or_else(|| AppError::UnknownField(name.to_string()))?
      .set_value(value)
  }

  /// Merge `incoming` into the slice. Every name must already exist with the
  /// same kind; on any mismatch nothing is written.
  pub fn replace_many(&mut self, incoming: BTreeMap<String, Field>) -> Result<(), AppError> {
    for (name, field) in &incoming {
      let current = self.get(name)?;
      if current.kind() != field.kind() {
        return Err(AppError::UnsupportedUpdate(format!(
          "{} is {:?}, got {:?}",
          name,
          current.kind(),
          field.kind()
        )));
      }
    }
    for (name, field) in incoming {
      if let Some(current) = self.fields.get_mut(&name) {
        current.set_value(field.current_value())?;
      }
    }
    Ok(())
  }

  pub fn iter(&self) -> impl Iterator<Item = &Field> {
    self.fields.values()
  }

  /// Flat wire form, keyed the way the defaults loader delivers it.
  pub fn to_raw(&self, kind: SliceKind) -> Map<String, Value> {
    let mut out = Map::new();
    for spec in kind.fields() {
      if let Some(field) = self.fields.get(spec.name()) {
        spec.encode(field, &mut out);
      }
    }
    out
  }
}

/// Update commands accepted by a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SettingsCommand {
  SetField { name: String, value: FieldValue },
  ReplaceMany { fields: BTreeMap<String, Field> },
}

impl SettingsCommand {
  /// Decode a command sent by the host. Anything other than the two known
  /// kinds (e.g. `"delete"`) is a programming error.
  pub fn parse(raw: &str) -> Result<Self, AppError> {
    log_failure(
      serde_json::from_str(raw).map_err(|e| AppError::UnsupportedUpdate(e.to_string())),
      "Rejected settings command",
    )
  }
}

/// Pure transition: returns the updated slice or the reason it was refused.
pub fn apply(mut slice: SettingsSlice, command: SettingsCommand) -> Result<SettingsSlice, AppError> {
  match command {
    SettingsCommand::SetField { name, value } => slice.set_value(&name, value)?,
    SettingsCommand::ReplaceMany { fields } => slice.replace_many(fields)?,
  }
  Ok(slice)
}

/// Owns one slice; populated once from defaults, then updated in place.
#[derive(Debug, Clone)]
pub struct SettingsStore {
  kind: SliceKind,
  slice: SettingsSlice,
  initialized: bool,
}

impl SettingsStore {
  pub fn new(kind: SliceKind) -> Self {
    Self {
      kind,
      slice: SettingsSlice::default(),
      initialized: false,
    }
  }

  pub fn kind(&self) -> SliceKind {
    self.kind
  }

  pub fn is_initialized(&self) -> bool {
    self.initialized
  }

  pub fn init_from_defaults(&mut self, raw: &Map<String, Value>) -> Result<(), AppError> {
    if self.initialized {
      return log_failure(
        Err(AppError::AlreadyInitialized(self.kind.label().to_string())),
        "Defaults loaded twice",
      );
    }
    if raw.is_empty() {
      warn!("No defaults for {} settings, starting empty", self.kind.label());
    }
    self.slice = SettingsSlice::from_fields(decode_slice(self.kind, raw));
    self.initialized = true;
    info!("Default {} settings loaded", self.kind.label());
    Ok(())
  }

  pub fn slice(&self) -> Result<&SettingsSlice, AppError> {
    self.ensure_initialized()?;
    Ok(&self.slice)
  }

  pub fn get(&self, name: &str) -> Result<&Field, AppError> {
    log_failure(self.slice()?.get(name), "Settings read failed")
  }

  pub fn text(&self, name: &str) -> Result<&str, AppError> {
    log_failure(self.slice()?.text(name), "Settings read failed")
  }

  pub fn set_value(&mut self, name: &str, value: impl Into<FieldValue>) -> Result<(), AppError> {
    self.dispatch(SettingsCommand::SetField {
      name: name.to_string(),
      value: value.into(),
    })
  }

  pub fn replace_many(&mut self, fields: BTreeMap<String, Field>) -> Result<(), AppError> {
    self.dispatch(SettingsCommand::ReplaceMany { fields })
  }

  pub fn dispatch(&mut self, command: SettingsCommand) -> Result<(), AppError> {
    self.ensure_initialized()?;
    let next = log_failure(apply(self.slice.clone(), command), "Settings update rejected")?;
    self.slice = next;
    Ok(())
  }

  /// Apply a flat raw object (saved preset, restored state). Only fields
  /// whose value key appears in `raw` are touched; flag tokens stay as stored.
  /// All or nothing.
  pub fn restore_from_raw(&mut self, raw: &Map<String, Value>) -> Result<(), AppError> {
    let mut next = self.slice()?.clone();
    for (name, value) in decode_present(self.kind, raw) {
      log_failure(next.set_value(name, value), "Settings restore rejected")?;
    }
    self.slice = next;
    Ok(())
  }

  pub fn to_raw(&self) -> Result<Map<String, Value>, AppError> {
    Ok(self.slice()?.to_raw(self.kind))
  }

  fn ensure_initialized(&self) -> Result<(), AppError> {
    if self.initialized {
      Ok(())
    } else {
      log_failure(
        Err(AppError::Uninitialized(self.kind.label().to_string())),
        "Settings used before loading",
      )
    }
  }
}

/// Per-engine form state: the selected model and the current field errors.
#[derive(Debug, Clone, Default)]
pub struct FormState {
  pub selected_model: Option<String>,
  pub validation: ValidationReport,
}

pub struct AppState {
  pub primary: SettingsStore,
  pub embedding: SettingsStore,
  pub app_paths: SettingsStore,
  pub primary_form: FormState,
  pub embedding_form: FormState,
  pub settings_loading: bool,
  pub settings_error: Option<ErrorEvent>,
}

impl Default for AppState {
  fn default() -> Self {
    Self::new()
  }
}

impl AppState {
  pub fn new() -> Self {
    Self {
      primary: SettingsStore::new(SliceKind::PrimaryEngine),
      embedding: SettingsStore::new(SliceKind::EmbeddingEngine),
      app_paths: SettingsStore::new(SliceKind::AppPaths),
      primary_form: FormState::default(),
      embedding_form: FormState::default(),
      settings_loading: false,
      settings_error: None,
    }
  }

  pub fn store(&self, kind: SliceKind) -> &SettingsStore {
    match kind {
      SliceKind::PrimaryEngine => &self.primary,
      SliceKind::EmbeddingEngine => &self.embedding,
      SliceKind::AppPaths => &self.app_paths,
    }
  }

  pub fn store_mut(&mut self, kind: SliceKind) -> &mut SettingsStore {
    match kind {
      SliceKind::PrimaryEngine => &mut self.primary,
      SliceKind::EmbeddingEngine => &mut self.embedding,
      SliceKind::AppPaths => &mut self.app_paths,
    }
  }

  pub fn is_initialized(&self) -> bool {
    SliceKind::ALL.iter().all(|kind| self.store(*kind).is_initialized())
  }

  /// Load all three slices from the loader. Slices that are already
  /// populated are left alone, so a failed attempt can simply be retried.
  pub fn initialize(&mut self, loader: &dyn DefaultSettingsLoader) -> Result<(), AppError> {
    self.settings_loading = true;
    self.settings_error = None;

    let result = loader.load().and_then(|raw| self.populate(&raw));

    self.settings_loading = false;
    if let Err(err) = &result {
      self.settings_error = Some(report_error(
        err.clone(),
        Some("Failed to initialize settings"),
      ));
    }
    result
  }

  fn populate(&mut self, raw: &RawSettings) -> Result<(), AppError> {
    for kind in SliceKind::ALL {
      let store = self.store_mut(kind);
      if store.is_initialized() {
        continue;
      }
      store.init_from_defaults(raw.for_slice(kind))?;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::util::capture_logs;
  use serde_json::json;

  struct StaticLoader(Result<RawSettings, AppError>);

  impl DefaultSettingsLoader for StaticLoader {
    fn load(&self) -> Result<RawSettings, AppError> {
      self.0.clone()
    }
  }

  fn empty_store(kind: SliceKind) -> SettingsStore {
    let mut store = SettingsStore::new(kind);
    store.init_from_defaults(&Map::new()).unwrap();
    store
  }

  #[test]
  fn test_set_value_leaves_other_fields_untouched() {
    let mut store = empty_store(SliceKind::PrimaryEngine);
    let before = store.slice().unwrap().clone();

    store.set_value("GPULayersCmd", "-ngl").unwrap();

    assert_eq!(store.text("GPULayersCmd").unwrap(), "-ngl");
    let after = store.slice().unwrap();
    for field in before.iter().filter(|f| f.name() != "GPULayersCmd") {
      assert_eq!(after.get(field.name()).unwrap(), field);
    }
  }

  #[test]
  fn test_get_unknown_field() {
    let store = empty_store(SliceKind::AppPaths);
    let err = store.get("NotAField").unwrap_err();
    assert_eq!(err, AppError::UnknownField("NotAField".to_string()));
  }

  #[test]
  fn test_access_before_init_is_rejected() {
    let mut store = SettingsStore::new(SliceKind::EmbeddingEngine);
    assert!(matches!(store.get("Description"), Err(AppError::Uninitialized(_))));
    assert!(matches!(
      store.set_value("Description", "hello"),
      Err(AppError::Uninitialized(_))
    ));
  }

  #[test]
  fn test_second_init_fails() {
    let mut store = empty_store(SliceKind::AppPaths);
    let err = store.init_from_defaults(&Map::new()).unwrap_err();
    assert!(matches!(err, AppError::AlreadyInitialized(_)));
  }

  #[test]
  fn test_replace_many_keeps_cmd_token() {
    let mut store = SettingsStore::new(SliceKind::PrimaryEngine);
    let raw = json!({ "CtxSizeCmd": "-c", "CtxSizeVal": "2048" });
    store.init_from_defaults(raw.as_object().unwrap()).unwrap();

    let mut incoming = BTreeMap::new();
    incoming.insert("CtxSize".to_string(), Field::flag_value("CtxSize", "--ctx", "8192"));
    store.replace_many(incoming).unwrap();

    assert_eq!(store.get("CtxSize").unwrap(), &Field::flag_value("CtxSize", "-c", "8192"));
  }

  #[test]
  fn test_replace_many_is_all_or_nothing() {
    let mut store = empty_store(SliceKind::PrimaryEngine);
    let mut incoming = BTreeMap::new();
    incoming.insert("Description".to_string(), Field::plain("Description", "changed"));
    incoming.insert("Missing".to_string(), Field::plain("Missing", "x"));

    assert!(store.replace_many(incoming).is_err());
    assert_eq!(store.text("Description").unwrap(), "");
  }

  #[test]
  fn test_replace_many_rejects_kind_change() {
    let mut store = empty_store(SliceKind::PrimaryEngine);
    let mut incoming = BTreeMap::new();
    incoming.insert("MemLock".to_string(), Field::plain("MemLock", "on"));
    let err = store.replace_many(incoming).unwrap_err();
    assert!(matches!(err, AppError::UnsupportedUpdate(_)));
  }

  #[test]
  fn test_parse_rejects_delete() {
    let err = SettingsCommand::parse(r#"{"kind":"delete","name":"TopK"}"#).unwrap_err();
    assert!(matches!(err, AppError::UnsupportedUpdate(_)));

    let cmd = SettingsCommand::parse(r#"{"kind":"set_field","name":"TopKVal","value":"40"}"#)
      .unwrap();
    assert_eq!(
      cmd,
      SettingsCommand::SetField {
        name: "TopKVal".to_string(),
        value: FieldValue::Text("40".to_string()),
      }
    );
  }

  #[test]
  fn test_apply_is_pure() {
    let slice = SettingsSlice::from_fields(vec![Field::flag_toggle("MemLock", "--mlock", false)]);
    let next = apply(
      slice.clone(),
      SettingsCommand::SetField {
        name: "MemLock".to_string(),
        value: FieldValue::Enabled(true),
      },
    )
    .unwrap();
    assert_eq!(slice.get("MemLock").unwrap().enabled(), Some(false));
    assert_eq!(next.get("MemLock").unwrap().enabled(), Some(true));
  }

  #[test]
  fn test_restore_from_raw_touches_present_keys_only() {
    let mut store = SettingsStore::new(SliceKind::PrimaryEngine);
    let raw = json!({ "TopKCmd": "--top-k", "TopKVal": "40", "Description": "baseline" });
    store.init_from_defaults(raw.as_object().unwrap()).unwrap();

    let preset = json!({ "TopKVal": "10" });
    store.restore_from_raw(preset.as_object().unwrap()).unwrap();

    assert_eq!(store.get("TopK").unwrap(), &Field::flag_value("TopK", "--top-k", "10"));
    assert_eq!(store.text("Description").unwrap(), "baseline");
  }

  #[test]
  fn test_restore_with_flag_keys_only_keeps_values() {
    let mut store = SettingsStore::new(SliceKind::PrimaryEngine);
    let raw = json!({
      "TopKCmd": "--top-k",
      "TopKVal": "40",
      "MemLockCmd": "--mlock",
      "MemLockCmdEnabled": true
    });
    store.init_from_defaults(raw.as_object().unwrap()).unwrap();

    let preset = json!({ "TopKCmd": "--other", "MemLockCmd": "--no-mlock" });
    store.restore_from_raw(preset.as_object().unwrap()).unwrap();

    assert_eq!(store.get("TopK").unwrap(), &Field::flag_value("TopK", "--top-k", "40"));
    assert_eq!(
      store.get("MemLock").unwrap(),
      &Field::flag_toggle("MemLock", "--mlock", true)
    );
  }

  #[test]
  fn test_programming_errors_are_logged() {
    let logs = capture_logs(|| {
      let mut fresh = SettingsStore::new(SliceKind::AppPaths);
      assert!(fresh.get("ModelPath").is_err());

      let mut store = empty_store(SliceKind::PrimaryEngine);
      assert!(store.set_value("Bogus", "x").is_err());
      assert!(store.init_from_defaults(&Map::new()).is_err());
      assert!(SettingsCommand::parse(r#"{"kind":"delete","name":"TopK"}"#).is_err());
      fresh.init_from_defaults(&Map::new()).unwrap();
    });
    assert!(logs.contains("Settings Not Loaded: Settings used before loading: app paths"));
    assert!(logs.contains("Unknown Setting: Settings update rejected: Bogus"));
    assert!(logs.contains("Settings Already Loaded: Defaults loaded twice: primary engine"));
    assert!(logs.contains("Unsupported Update: Rejected settings command"));
  }

  #[test]
  fn test_to_raw_uses_flat_keys() {
    let mut store = SettingsStore::new(SliceKind::PrimaryEngine);
    let raw = json!({ "MemLockCmd": "--mlock", "MemLockCmdEnabled": true });
    store.init_from_defaults(raw.as_object().unwrap()).unwrap();
    let out = store.to_raw().unwrap();
    assert_eq!(out.get("MemLockCmd"), Some(&json!("--mlock")));
    assert_eq!(out.get("MemLockCmdEnabled"), Some(&json!(true)));
    assert_eq!(out.get("CtxSizeVal"), Some(&json!("")));
  }

  #[test]
  fn test_initialize_failure_sets_inline_message() {
    let mut state = AppState::new();
    let loader = StaticLoader(Err(AppError::Settings("defaults.json is not valid JSON".to_string())));

    assert!(state.initialize(&loader).is_err());
    assert!(!state.settings_loading);
    let message = state.settings_error.as_ref().unwrap().inline_message();
    assert_eq!(message, "Failed to initialize settings: defaults.json is not valid JSON");
    assert!(!state.is_initialized());

    let loader = StaticLoader(Ok(RawSettings::default()));
    state.initialize(&loader).unwrap();
    assert!(state.is_initialized());
    assert!(state.settings_error.is_none());
  }
}
