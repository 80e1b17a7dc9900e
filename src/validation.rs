use crate::catalog::SliceKind;
use crate::constants::DESCRIPTION_MIN_CHARS;
use crate::state::SettingsSlice;
use serde::Serialize;
use std::collections::BTreeMap;

/// Field name -> message. Empty when the slice may be submitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
  pub errors: BTreeMap<String, String>,
}

impl ValidationReport {
  pub fn is_valid(&self) -> bool {
    self.errors.is_empty()
  }

  pub fn error_for(&self, field: &str) -> Option<&str> {
    self.errors.get(field).map(String::as_str)
  }

  pub fn summary(&self) -> String {
    self
      .errors
      .iter()
      .map(|(field, msg)| format!("{field}: {msg}"))
      .collect::<Vec<_>>()
      .join("; ")
  }

  fn add(&mut self, field: &str, message: &str) {
    self.errors.insert(field.to_string(), message.to_string());
  }
}

pub fn validate(kind: SliceKind, slice: &SettingsSlice) -> ValidationReport {
  let mut report = ValidationReport::default();
  let text = |name: &str| slice.text(name).unwrap_or("");

  match kind {
    SliceKind::PrimaryEngine => {
      check_description(&mut report, text("Description"));
      if text("GPULayersCmd").trim().is_empty() {
        report.add("GPULayersCmd", "GPU Layers Command cannot be empty.");
      }
    }
    SliceKind::EmbeddingEngine => {
      check_description(&mut report, text("Description"));
      if text("EmbedGPULayersVal").is_empty() {
        report.add("EmbedGPULayersVal", "GPU Layers cannot be empty.");
      }
      if text("EmbedModelFullPath").trim().is_empty() {
        report.add("EmbedModelFullPath", "Embed model path is required.");
      }
    }
    SliceKind::AppPaths => {}
  }

  report
}

fn check_description(report: &mut ValidationReport, description: &str) {
  if description.is_empty() {
    report.add("Description", "Description is required.");
  } else if description.chars().count() < DESCRIPTION_MIN_CHARS {
    report.add("Description", "Description must be at least 5 characters.");
  }
}
