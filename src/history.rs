use crate::constants::SELECTION_WINDOW_CAPACITY;
use crate::errors::AppError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::info;

/// One past inference run, read-only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkItem {
  pub idx: i64,
  pub prompt: String,
  pub completion: String,
  pub args: String,
  pub date: String,
}

pub trait WorkItemStore {
  fn list(&self) -> Result<Vec<WorkItem>, AppError>;
}

pub fn parse_work_items(raw: &str) -> Result<Vec<WorkItem>, AppError> {
  serde_json::from_str(raw).map_err(|e| AppError::Storage(format!("invalid history: {e}")))
}

/// History kept as one JSON array on disk.
pub struct JsonWorkItemStore {
  path: PathBuf,
}

impl JsonWorkItemStore {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }
}

impl WorkItemStore for JsonWorkItemStore {
  fn list(&self) -> Result<Vec<WorkItem>, AppError> {
    if !self.path.exists() {
      return Ok(Vec::new());
    }
    let raw = fs::read_to_string(&self.path)
      .map_err(|e| AppError::Storage(format!("{}: {}", self.path.display(), e)))?;
    if raw.trim().is_empty() {
      return Ok(Vec::new());
    }
    let items = parse_work_items(&raw)?;
    info!("Loaded {} history item(s)", items.len());
    Ok(items)
  }
}

/// Up to two selected work-item indices, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SelectionWindow {
  selected: Vec<i64>,
}

impl SelectionWindow {
  pub fn new() -> Self {
    Self::default()
  }

  /// Deselect `idx` if selected; otherwise select it, dropping the oldest
  /// entry when the window is full.
  pub fn toggle(&mut self, idx: i64) {
    if let Some(pos) = self.selected.iter().position(|&i| i == idx) {
      self.selected.remove(pos);
      return;
    }
    if self.selected.len() >= SELECTION_WINDOW_CAPACITY {
      self.selected.remove(0);
    }
    self.selected.push(idx);
  }

  pub fn can_submit(&self) -> bool {
    self.selected.len() == SELECTION_WINDOW_CAPACITY
  }

  /// Rows outside a full window are disabled.
  pub fn is_selectable(&self, idx: i64) -> bool {
    self.selected.len() < SELECTION_WINDOW_CAPACITY || self.selected.contains(&idx)
  }

  pub fn contains(&self, idx: i64) -> bool {
    self.selected.contains(&idx)
  }

  pub fn clear(&mut self) {
    self.selected.clear();
  }

  pub fn len(&self) -> usize {
    self.selected.len()
  }

  pub fn is_empty(&self) -> bool {
    self.selected.is_empty()
  }

  pub fn as_slice(&self) -> &[i64] {
    &self.selected
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_toggle_three_keeps_last_two() {
    let mut window = SelectionWindow::new();
    window.toggle(1);
    window.toggle(2);
    window.toggle(3);
    assert_eq!(window.as_slice(), &[2, 3]);
    assert!(window.can_submit());
  }

  #[test]
  fn test_toggle_is_self_inverse_without_eviction() {
    let mut window = SelectionWindow::new();
    window.toggle(7);
    let before = window.clone();
    window.toggle(4);
    window.toggle(4);
    assert_eq!(window, before);
  }

  #[test]
  fn test_toggle_after_eviction_is_not_inverse() {
    let mut window = SelectionWindow::new();
    window.toggle(1);
    window.toggle(2);
    let before = window.clone();
    window.toggle(3);
    window.toggle(3);
    assert_ne!(window, before);
    assert_eq!(window.as_slice(), &[2]);
  }

  #[test]
  fn test_window_never_exceeds_two() {
    let mut window = SelectionWindow::new();
    for idx in [5, 1, 5, 9, 2, 2, 3, 8, 1, 1, 4] {
      window.toggle(idx);
      assert!(window.len() <= 2);
    }
  }

  #[test]
  fn test_is_selectable() {
    let mut window = SelectionWindow::new();
    assert!(window.is_selectable(1));
    window.toggle(1);
    window.toggle(2);
    assert!(window.is_selectable(2));
    assert!(!window.is_selectable(3));
  }

  #[test]
  fn test_parse_work_items_fills_missing() {
    let items = parse_work_items(r#"[{"idx": 3, "prompt": "hi"}, {"idx": 4, "date": "2024-01-01"}]"#).unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].completion, "");
    assert_eq!(items[1].date, "2024-01-01");
    assert!(matches!(parse_work_items("{}"), Err(AppError::Storage(_))));
  }

  #[test]
  fn test_json_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("history.json");
    assert!(JsonWorkItemStore::new(&path).list().unwrap().is_empty());

    fs::write(&path, r#"[{"idx": 1, "completion": "a"}]"#).unwrap();
    let items = JsonWorkItemStore::new(&path).list().unwrap();
    assert_eq!(items[0].idx, 1);
  }
}
