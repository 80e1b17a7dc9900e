use crate::constants::{MODEL_FILE_EXTENSION, MODEL_LOG_SUFFIX};
use crate::derived::compute_derived;
use crate::errors::AppError;
use crate::util::normalize_separators;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info};

/// A model file as reported by a lister.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelFile {
  pub file_name: String,
  pub full_path: String,
  #[serde(default)]
  pub size_mb: u64,
}

/// Lookup form of a model file. Rebuilt from the lister on every refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelDescriptor {
  pub id: String,
  pub file_name: String,
  pub full_path: String,
}

impl From<&ModelFile> for ModelDescriptor {
  fn from(file: &ModelFile) -> Self {
    let full_path = normalize_separators(&file.full_path);
    Self {
      id: full_path.clone(),
      file_name: file.file_name.clone(),
      full_path,
    }
  }
}

pub fn describe(files: &[ModelFile]) -> Vec<ModelDescriptor> {
  files.iter().map(ModelDescriptor::from).collect()
}

pub trait ModelLister {
  fn list(&self) -> Result<Vec<ModelFile>, AppError>;
}

/// Lists `.gguf` files directly inside one folder.
pub struct DirectoryModelLister {
  dir: PathBuf,
}

impl DirectoryModelLister {
  pub fn new(dir: impl Into<PathBuf>) -> Self {
    Self { dir: dir.into() }
  }

  pub fn dir(&self) -> &PathBuf {
    &self.dir
  }
}

impl ModelLister for DirectoryModelLister {
  fn list(&self) -> Result<Vec<ModelFile>, AppError> {
    let entries = fs::read_dir(&self.dir)
      .map_err(|e| AppError::Model(format!("Cannot read {}: {}", self.dir.display(), e)))?;

    let mut models = Vec::new();
    for entry in entries.flatten() {
      let path = entry.path();
      if !path.is_file() {
        continue;
      }
      let extension = path.extension().and_then(|s| s.to_str()).unwrap_or("");
      if !extension.eq_ignore_ascii_case(MODEL_FILE_EXTENSION) {
        continue;
      }
      let file_name = match path.file_name().and_then(|s| s.to_str()) {
        Some(name) => name.to_string(),
        None => continue,
      };
      let size_mb = entry
        .metadata()
        .map(|m| m.len() / (1024 * 1024))
        .unwrap_or(0);
      models.push(ModelFile {
        file_name,
        full_path: path.to_string_lossy().to_string(),
        size_mb,
      });
    }
    models.sort_by(|a, b| a.file_name.cmp(&b.file_name));

    info!("Found {} model(s) in {}", models.len(), self.dir.display());
    Ok(models)
  }
}

/// Field values produced by a resolved model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelResolution {
  pub id: String,
  pub full_path: String,
  pub log_file_name: String,
}

/// Look `selected_id` up in `models`. `None` when it is not (yet) listed.
pub fn resolve_selection(
  selected_id: &str,
  models: &[ModelDescriptor],
  log_folder: &str,
) -> Option<ModelResolution> {
  let id = normalize_separators(selected_id);
  let Some(model) = models.iter().find(|m| m.id == id) else {
    debug!("Model {} not in list of {}", id, models.len());
    return None;
  };
  Some(ModelResolution {
    id,
    full_path: model.full_path.clone(),
    log_file_name: compute_derived(log_folder, &format!("{}{}", model.file_name, MODEL_LOG_SUFFIX)),
  })
}

/// What was saved about a model selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistedModel {
  pub full_path: String,
  pub folder: String,
  pub file_name: String,
}

impl PersistedModel {
  /// The explicit full path when present, else `folder + file_name`.
  pub fn expected_id(&self) -> String {
    if !self.full_path.trim().is_empty() {
      self.full_path.clone()
    } else {
      format!("{}{}", self.folder, self.file_name)
    }
  }
}

pub fn initialize_from_persisted(
  persisted: &PersistedModel,
  models: &[ModelDescriptor],
  log_folder: &str,
) -> Option<ModelResolution> {
  resolve_selection(&persisted.expected_id(), models, log_folder)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn models() -> Vec<ModelDescriptor> {
    describe(&[
      ModelFile {
        file_name: "llama-7b.gguf".to_string(),
        full_path: r"C:\models\llama-7b.gguf".to_string(),
        size_mb: 0,
      },
      ModelFile {
        file_name: "embed.gguf".to_string(),
        full_path: "/srv/models/embed.gguf".to_string(),
        size_mb: 0,
      },
    ])
  }

  #[test]
  fn test_descriptor_normalizes_separators() {
    let list = models();
    assert_eq!(list[0].id, "C:/models/llama-7b.gguf");
    assert_eq!(list[0].full_path, "C:/models/llama-7b.gguf");
  }

  #[test]
  fn test_resolve_selection_accepts_either_separator() {
    let list = models();
    let res = resolve_selection(r"C:\models\llama-7b.gguf", &list, "/models/logs/").unwrap();
    assert_eq!(res.full_path, "C:/models/llama-7b.gguf");
    assert_eq!(res.log_file_name, "/models/logs/llama-7b.gguf.log");
  }

  #[test]
  fn test_resolve_selection_missing_is_none() {
    assert!(resolve_selection("/nope.gguf", &models(), "/logs/").is_none());
    assert!(resolve_selection("/srv/models/embed.gguf", &[], "/logs/").is_none());
  }

  #[test]
  fn test_persisted_prefers_full_path() {
    let persisted = PersistedModel {
      full_path: "/srv/models/embed.gguf".to_string(),
      folder: "C:/models/".to_string(),
      file_name: "llama-7b.gguf".to_string(),
    };
    let res = initialize_from_persisted(&persisted, &models(), "/app/logs/").unwrap();
    assert_eq!(res.id, "/srv/models/embed.gguf");
    assert_eq!(res.log_file_name, "/app/logs/embed.gguf.log");
  }

  #[test]
  fn test_persisted_falls_back_to_folder_and_file() {
    let persisted = PersistedModel {
      full_path: "  ".to_string(),
      folder: r"C:\models\".to_string(),
      file_name: "llama-7b.gguf".to_string(),
    };
    let res = initialize_from_persisted(&persisted, &models(), "").unwrap();
    assert_eq!(res.full_path, "C:/models/llama-7b.gguf");
  }

  #[test]
  fn test_directory_lister_filters_and_sorts() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("b.gguf"), b"x").unwrap();
    fs::write(dir.path().join("a.GGUF"), b"x").unwrap();
    fs::write(dir.path().join("notes.txt"), b"x").unwrap();
    fs::create_dir(dir.path().join("c.gguf")).unwrap();

    let files = DirectoryModelLister::new(dir.path()).list().unwrap();
    let names: Vec<&str> = files.iter().map(|f| f.file_name.as_str()).collect();
    assert_eq!(names, vec!["a.GGUF", "b.gguf"]);
  }

  #[test]
  fn test_directory_lister_missing_folder() {
    let dir = tempfile::tempdir().unwrap();
    let err = DirectoryModelLister::new(dir.path().join("absent")).list().unwrap_err();
    assert!(matches!(err, AppError::Model(_)));
  }
}
