use crate::catalog::SliceKind;
use crate::errors::AppError;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fs;
use std::path::PathBuf;
use tracing::{info, warn};

/// Flat default values for all three slices.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RawSettings {
  pub primary_engine: Map<String, Value>,
  pub embedding_engine: Map<String, Value>,
  pub app_paths: Map<String, Value>,
}

impl RawSettings {
  pub fn for_slice(&self, kind: SliceKind) -> &Map<String, Value> {
    match kind {
      SliceKind::PrimaryEngine => &self.primary_engine,
      SliceKind::EmbeddingEngine => &self.embedding_engine,
      SliceKind::AppPaths => &self.app_paths,
    }
  }

  pub fn for_slice_mut(&mut self, kind: SliceKind) -> &mut Map<String, Value> {
    match kind {
      SliceKind::PrimaryEngine => &mut self.primary_engine,
      SliceKind::EmbeddingEngine => &mut self.embedding_engine,
      SliceKind::AppPaths => &mut self.app_paths,
    }
  }
}

pub trait DefaultSettingsLoader {
  fn load(&self) -> Result<RawSettings, AppError>;
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DefaultsDocument {
  Ordered(Map<String, Value>, Map<String, Value>, Map<String, Value>),
  Named(RawSettings),
}

/// Decode `[primary, embedding, app_paths]` or the keyed object form.
pub fn parse_defaults(raw: &str) -> Result<RawSettings, AppError> {
  if raw.trim().is_empty() {
    return Err(AppError::Settings("defaults are empty".to_string()));
  }
  let value: Value =
    serde_json::from_str(raw).map_err(|e| AppError::Settings(format!("invalid JSON: {e}")))?;
  if let Value::Array(items) = &value {
    if items.len() != 3 {
      return Err(AppError::Settings(format!(
        "expected 3 settings objects, got {}",
        items.len()
      )));
    }
  }
  match serde_json::from_value(value) {
    Ok(DefaultsDocument::Ordered(primary_engine, embedding_engine, app_paths)) => Ok(RawSettings {
      primary_engine,
      embedding_engine,
      app_paths,
    }),
    Ok(DefaultsDocument::Named(settings)) => Ok(settings),
    Err(e) => Err(AppError::Settings(format!("unexpected defaults shape: {e}"))),
  }
}

pub struct JsonDefaultsLoader {
  path: PathBuf,
}

impl JsonDefaultsLoader {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }
}

impl DefaultSettingsLoader for JsonDefaultsLoader {
  fn load(&self) -> Result<RawSettings, AppError> {
    let raw = fs::read_to_string(&self.path)
      .map_err(|e| AppError::Settings(format!("{}: {}", self.path.display(), e)))?;
    let settings = parse_defaults(&raw)?;
    info!("Defaults loaded from {}", self.path.display());
    Ok(settings)
  }
}

type EnvLookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Reads every catalog key from the environment, prefixed per slice:
/// `PRIMARY_CtxSizeVal`, `EMBEDDING_Description`, `APP_ModelPath`.
pub struct EnvDefaultsLoader {
  lookup: EnvLookup,
}

impl Default for EnvDefaultsLoader {
  fn default() -> Self {
    Self::new()
  }
}

impl EnvDefaultsLoader {
  pub fn new() -> Self {
    Self::from_lookup(|key| std::env::var(key).ok())
  }

  pub fn from_lookup(lookup: impl Fn(&str) -> Option<String> + Send + Sync + 'static) -> Self {
    Self {
      lookup: Box::new(lookup),
    }
  }

  pub fn env_prefix(kind: SliceKind) -> &'static str {
    match kind {
      SliceKind::PrimaryEngine => "PRIMARY_",
      SliceKind::EmbeddingEngine => "EMBEDDING_",
      SliceKind::AppPaths => "APP_",
    }
  }
}

impl DefaultSettingsLoader for EnvDefaultsLoader {
  fn load(&self) -> Result<RawSettings, AppError> {
    let mut settings = RawSettings::default();
    let mut found = 0usize;
    for kind in SliceKind::ALL {
      let prefix = Self::env_prefix(kind);
      let out = settings.for_slice_mut(kind);
      for key in kind.fields().iter().flat_map(|spec| spec.keys()) {
        if let Some(value) = (self.lookup)(&format!("{prefix}{key}")) {
          out.insert(key.to_string(), Value::String(value));
          found += 1;
        }
      }
    }
    if found == 0 {
      warn!("No settings found in the environment, using empty defaults");
    } else {
      info!("{} default value(s) read from the environment", found);
    }
    Ok(settings)
  }
}
