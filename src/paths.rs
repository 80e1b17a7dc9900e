use crate::constants::{ENV_CONFIG_DIR, ENV_DATA_DIR, ENV_MODEL_DIR};
use std::fs;
use std::path::{Path, PathBuf};

fn env_dir(var: &str) -> Option<PathBuf> {
  let dir = std::env::var(var).ok()?;
  let trimmed = dir.trim();
  if trimmed.is_empty() {
    None
  } else {
    Some(PathBuf::from(trimmed))
  }
}

fn base_or_cwd(var: &str) -> PathBuf {
  env_dir(var).unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}

pub fn resolve_config_path(filename: &str) -> PathBuf {
  let base = base_or_cwd(ENV_CONFIG_DIR);
  let _ = fs::create_dir_all(&base);
  base.join(filename)
}

pub fn resolve_data_path(filename: &str) -> PathBuf {
  let base = base_or_cwd(ENV_DATA_DIR);
  let _ = fs::create_dir_all(&base);
  base.join(filename)
}

/// Model folder: the env override when set, else the configured `ModelPath`.
/// Unlike the config and data folders this is never created.
pub fn resolve_models_dir(configured: &str) -> Option<PathBuf> {
  if let Some(dir) = env_dir(ENV_MODEL_DIR) {
    return Some(dir);
  }
  let trimmed = configured.trim();
  if trimmed.is_empty() {
    None
  } else {
    Some(PathBuf::from(trimmed))
  }
}

/// Engine binary from the configured path, falling back to a `PATH` lookup
/// of the bare file name.
pub fn resolve_engine_binary(configured: &str) -> Option<PathBuf> {
  let trimmed = configured.trim();
  if trimmed.is_empty() {
    return None;
  }
  let candidate = PathBuf::from(trimmed);
  if candidate.exists() {
    return Some(candidate);
  }
  let name = Path::new(trimmed).file_name()?;
  which::which(name).ok()
}
