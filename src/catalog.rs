// Field catalog
//
// The full known field set of each slice, and how each field maps onto the
// flat keys the defaults loader and the inference runner exchange:
//
//   PlainValue     "Description"                  -> Description
//   FlagValuePair  "CtxSize"  (-c 2048)           -> CtxSizeCmd, CtxSizeVal
//   FlagTogglePair "MemLock"  (--mlock, on)       -> MemLockCmd, MemLockCmdEnabled

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::fields::{Field, FieldValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SliceKind {
  PrimaryEngine,
  EmbeddingEngine,
  AppPaths,
}

impl SliceKind {
  pub const ALL: [SliceKind; 3] = [
    SliceKind::PrimaryEngine,
    SliceKind::EmbeddingEngine,
    SliceKind::AppPaths,
  ];

  pub fn label(self) -> &'static str {
    match self {
      SliceKind::PrimaryEngine => "primary engine",
      SliceKind::EmbeddingEngine => "embedding engine",
      SliceKind::AppPaths => "app paths",
    }
  }

  pub fn fields(self) -> &'static [FieldSpec] {
    match self {
      SliceKind::PrimaryEngine => PRIMARY_ENGINE_FIELDS,
      SliceKind::EmbeddingEngine => EMBEDDING_ENGINE_FIELDS,
      SliceKind::AppPaths => APP_PATH_FIELDS,
    }
  }

  pub fn spec(self, name: &str) -> Option<&'static FieldSpec> {
    self.fields().iter().find(|spec| spec.name() == name)
  }
}

impl std::str::FromStr for SliceKind {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
      "primary" | "primary_engine" | "cli" => Ok(SliceKind::PrimaryEngine),
      "embedding" | "embedding_engine" | "embed" => Ok(SliceKind::EmbeddingEngine),
      "app" | "app_paths" | "paths" => Ok(SliceKind::AppPaths),
      other => Err(format!("unknown slice: {other}")),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSpec {
  Plain {
    name: &'static str,
  },
  FlagValue {
    name: &'static str,
    cmd_key: &'static str,
    val_key: &'static str,
  },
  FlagToggle {
    name: &'static str,
    cmd_key: &'static str,
    enabled_key: &'static str,
  },
}

const fn plain(name: &'static str) -> FieldSpec {
  FieldSpec::Plain { name }
}

const fn pair(name: &'static str, cmd_key: &'static str, val_key: &'static str) -> FieldSpec {
  FieldSpec::FlagValue { name, cmd_key, val_key }
}

const fn toggle(name: &'static str, cmd_key: &'static str, enabled_key: &'static str) -> FieldSpec {
  FieldSpec::FlagToggle {
    name,
    cmd_key,
    enabled_key,
  }
}

impl FieldSpec {
  pub fn name(&self) -> &'static str {
    match self {
      FieldSpec::Plain { name }
      | FieldSpec::FlagValue { name, .. }
      | FieldSpec::FlagToggle { name, .. } => *name,
    }
  }

  /// Flat keys this field occupies in the raw form.
  pub fn keys(&self) -> Vec<&'static str> {
    match self {
      FieldSpec::Plain { name } => vec![*name],
      FieldSpec::FlagValue { cmd_key, val_key, .. } => vec![*cmd_key, *val_key],
      FieldSpec::FlagToggle {
        cmd_key,
        enabled_key,
        ..
      } => vec![*cmd_key, *enabled_key],
    }
  }

  /// Build the field from a flat raw object. Missing keys become empty.
  pub fn decode(&self, raw: &Map<String, Value>) -> Field {
    match self {
      FieldSpec::Plain { name } => Field::plain(name, &raw_text(raw, name)),
      FieldSpec::FlagValue {
        name,
        cmd_key,
        val_key,
      } => Field::flag_value(name, &raw_text(raw, cmd_key), &raw_text(raw, val_key)),
      FieldSpec::FlagToggle {
        name,
        cmd_key,
        enabled_key,
      } => Field::flag_toggle(name, &raw_text(raw, cmd_key), raw_flag(raw, enabled_key)),
    }
  }

  /// The mutable part of the field when its value key is present in `raw`.
  /// A flag key on its own carries no value.
  pub fn value_in(&self, raw: &Map<String, Value>) -> Option<FieldValue> {
    match self {
      FieldSpec::Plain { name: key } | FieldSpec::FlagValue { val_key: key, .. } => raw
        .contains_key(*key)
        .then(|| FieldValue::Text(raw_text(raw, key))),
      FieldSpec::FlagToggle { enabled_key, .. } => raw
        .contains_key(*enabled_key)
        .then(|| FieldValue::Enabled(raw_flag(raw, enabled_key))),
    }
  }

  /// Write the field back into flat keys.
  pub fn encode(&self, field: &Field, out: &mut Map<String, Value>) {
    match (self, field) {
      (FieldSpec::Plain { name }, Field::PlainValue { value, .. }) => {
        out.insert(name.to_string(), Value::String(value.clone()));
      }
      (
        FieldSpec::FlagValue { cmd_key, val_key, .. },
        Field::FlagValuePair { cmd_token, value, .. },
      ) => {
        out.insert(cmd_key.to_string(), Value::String(cmd_token.clone()));
        out.insert(val_key.to_string(), Value::String(value.clone()));
      }
      (
        FieldSpec::FlagToggle {
          cmd_key,
          enabled_key,
          ..
        },
        Field::FlagTogglePair {
          cmd_token, enabled, ..
        },
      ) => {
        out.insert(cmd_key.to_string(), Value::String(cmd_token.clone()));
        out.insert(enabled_key.to_string(), Value::Bool(*enabled));
      }
      (spec, field) => {
        debug!(
          "Skipping {}: stored kind {:?} does not match catalog",
          spec.name(),
          field.kind()
        );
      }
    }
  }
}

fn raw_text(raw: &Map<String, Value>, key: &str) -> String {
  match raw.get(key) {
    Some(Value::String(s)) => s.clone(),
    Some(Value::Number(n)) => n.to_string(),
    Some(Value::Bool(b)) => b.to_string(),
    _ => String::new(),
  }
}

fn raw_flag(raw: &Map<String, Value>, key: &str) -> bool {
  match raw.get(key) {
    Some(Value::Bool(b)) => *b,
    Some(Value::String(s)) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "on"),
    Some(Value::Number(n)) => n.as_i64().map(|v| v != 0).unwrap_or(false),
    _ => false,
  }
}

/// Decode every catalog field of `kind` from a flat raw object.
pub fn decode_slice(kind: SliceKind, raw: &Map<String, Value>) -> Vec<Field> {
  let known: Vec<&str> = kind.fields().iter().flat_map(|spec| spec.keys()).collect();
  for key in raw.keys() {
    if !known.contains(&key.as_str()) {
      debug!("Ignoring unknown {} key: {}", kind.label(), key);
    }
  }
  kind.fields().iter().map(|spec| spec.decode(raw)).collect()
}

/// Values of the catalog fields whose value keys appear in `raw`.
pub fn decode_present(kind: SliceKind, raw: &Map<String, Value>) -> Vec<(&'static str, FieldValue)> {
  kind
    .fields()
    .iter()
    .filter_map(|spec| spec.value_in(raw).map(|value| (spec.name(), value)))
    .collect()
}

pub const PRIMARY_ENGINE_FIELDS: &[FieldSpec] = &[
  plain("Description"),
  plain("PromptText"),
  plain("GPULayersCmd"),
  plain("GPULayersVal"),
  pair("ModelFullPath", "ModelCmd", "ModelFullPathVal"),
  pair("ModelLogFileName", "ModelLogFileCmd", "ModelLogFileNameVal"),
  pair("PromptCache", "PromptCacheCmd", "PromptCacheVal"),
  pair("PromptFile", "PromptFileCmd", "PromptFileVal"),
  pair("ChatTemplate", "ChatTemplateCmd", "ChatTemplateVal"),
  pair("CtxSize", "CtxSizeCmd", "CtxSizeVal"),
  pair("RopeScale", "RopeScaleCmd", "RopeScaleVal"),
  pair("ReversePrompt", "ReversePromptCmd", "ReversePromptVal"),
  pair("InPrefix", "InPrefixCmd", "InPrefixVal"),
  pair("InSuffix", "InSuffixCmd", "InSuffixVal"),
  pair("ThreadsBatch", "ThreadsBatchCmd", "ThreadsBatchVal"),
  pair("Threads", "ThreadsCmd", "ThreadsVal"),
  pair("Keep", "KeepCmd", "KeepVal"),
  pair("TopK", "TopKCmd", "TopKVal"),
  pair("TopP", "TopPCmd", "TopPVal"),
  pair("MinP", "MinPCmd", "MinPVal"),
  pair("MainGPU", "MainGPUCmd", "MainGPUVal"),
  pair("RepeatPenalty", "RepeatPenaltyCmd", "RepeatPenaltyVal"),
  pair("RepeatLastPenalty", "RepeatLastPenaltyCmd", "RepeatLastPenaltyVal"),
  pair("Temperature", "TemperatureCmd", "TemperatureVal"),
  pair("Predict", "PredictCmd", "PredictVal"),
  pair("RandomSeed", "RandomSeedCmd", "RandomSeedVal"),
  toggle("Prompt", "PromptCmd", "PromptCmdEnabled"),
  toggle("Conversation", "ConversationCmd", "ConversationCmdEnabled"),
  toggle("MultilineInput", "MultilineInputCmd", "MultilineInputCmdEnabled"),
  toggle("InteractiveFirst", "InteractiveFirstCmd", "InteractiveFirstCmdEnabled"),
  toggle("InteractiveMode", "InteractiveModeCmd", "InteractiveModeCmdEnabled"),
  toggle("MemLock", "MemLockCmd", "MemLockCmdEnabled"),
  toggle("EscapeNewLines", "EscapeNewLinesCmd", "EscapeNewLinesCmdEnabled"),
  toggle("NoDisplayPrompt", "NoDisplayPromptCmd", "NoDisplayPromptEnabled"),
  toggle("LogVerbose", "LogVerboseCmd", "LogVerboseEnabled"),
  toggle("FlashAttention", "FlashAttentionCmd", "FlashAttentionCmdEnabled"),
  toggle("NoMMap", "NoMMApCmd", "NoMMApCmdEnabled"),
  toggle("PromptCacheAll", "PromptCacheAllCmd", "PromptCacheAllEnabled"),
];

pub const EMBEDDING_ENGINE_FIELDS: &[FieldSpec] = &[
  plain("Description"),
  plain("EmbedGPULayersCmd"),
  plain("EmbedGPULayersVal"),
  pair("EmbedModelFullPath", "EmbedModelPathCmd", "EmbedModelFullPathVal"),
  pair("EmbedModelLogFileName", "EmbedModelLogFileCmd", "EmbedModelLogFileNameVal"),
  pair("EmbedCtxSize", "EmbedCtxSizeCmd", "EmbedCtxSizeVal"),
  pair("EmbedBatchSize", "EmbedBatchSizeCmd", "EmbedBatchSizeVal"),
  pair("EmbedUbatchSize", "EmbedUbatchSizeCmd", "EmbedUbatchSizeVal"),
  pair("EmbedThreads", "EmbedThreadsCmd", "EmbedThreadsVal"),
  pair("EmbedThreadsBatch", "EmbedThreadsBatchCmd", "EmbedThreadsBatchVal"),
  pair("EmbedKeep", "EmbedKeepCmd", "EmbedKeepVal"),
  pair("EmbedTopK", "EmbedTopKCmd", "EmbedTopKVal"),
  pair("EmbedTemperature", "EmbedTemperatureCmd", "EmbedTemperatureVal"),
  pair("EmbedRepeatPenalty", "EmbedRepeatPenaltyCmd", "EmbedRepeatPenaltyVal"),
  pair("EmbedMainGPU", "EmbedMainGPUCmd", "EmbedMainGPUVal"),
  pair("EmbedSeparator", "EmbedSeparatorCmd", "EmbedSeparatorVal"),
  pair("EmbedPooling", "EmbedPoolingCmd", "EmbedPoolingVal"),
  pair("EmbedOutputFormat", "EmbedOutputFormatCmd", "EmbedOutputFormatVal"),
  pair("EmbedNormalize", "EmbedNormalizeCmd", "EmbedNormalizeVal"),
  pair("EmbedPromptFile", "EmbedPromptFileCmd", "EmbedPromptFileVal"),
  toggle("EmbedPrompt", "EmbedPromptCmd", "EmbedPromptCmdEnabled"),
  toggle("EmbedFlashAttention", "EmbedFlashAttentionCmd", "EmbedFlashAttentionCmdEnabled"),
];

pub const APP_PATH_FIELDS: &[FieldSpec] = &[
  plain("LLamaCliPath"),
  plain("LLamaEmbedCliPath"),
  plain("ModelPath"),
  plain("ModelFileName"),
  plain("EmbedModelFileName"),
  plain("ModelFullPathVal"),
  plain("EmbedModelFullPathVal"),
  plain("AppLogPath"),
  plain("AppLogFileName"),
  plain("ModelLogPath"),
  plain("PromptCachePath"),
  plain("ReportDataPath"),
];

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;
  use std::collections::HashSet;

  fn as_map(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
  }

  #[test]
  fn test_names_are_unique_per_slice() {
    for kind in SliceKind::ALL {
      let mut seen = HashSet::new();
      for spec in kind.fields() {
        assert!(seen.insert(spec.name()), "duplicate field {} in {:?}", spec.name(), kind);
      }
    }
  }

  #[test]
  fn test_flat_keys_are_unique_per_slice() {
    for kind in SliceKind::ALL {
      let mut seen = HashSet::new();
      for key in kind.fields().iter().flat_map(|spec| spec.keys()) {
        assert!(seen.insert(key), "duplicate key {} in {:?}", key, kind);
      }
    }
  }

  #[test]
  fn test_decode_pair_and_toggle() {
    let raw = as_map(json!({
      "CtxSizeCmd": "-c",
      "CtxSizeVal": 4096,
      "MemLockCmd": "--mlock",
      "MemLockCmdEnabled": "true",
    }));
    let ctx = SliceKind::PrimaryEngine.spec("CtxSize").unwrap().decode(&raw);
    assert_eq!(ctx, Field::flag_value("CtxSize", "-c", "4096"));
    let mlock = SliceKind::PrimaryEngine.spec("MemLock").unwrap().decode(&raw);
    assert_eq!(mlock, Field::flag_toggle("MemLock", "--mlock", true));
  }

  #[test]
  fn test_decode_slice_fills_missing_with_empty() {
    let fields = decode_slice(SliceKind::AppPaths, &Map::new());
    assert_eq!(fields.len(), APP_PATH_FIELDS.len());
    assert!(fields.iter().all(|f| f.text() == Some("")));
  }

  #[test]
  fn test_encode_round_trips_keys() {
    let spec = SliceKind::EmbeddingEngine.spec("EmbedModelFullPath").unwrap();
    let mut out = Map::new();
    spec.encode(&Field::flag_value("EmbedModelFullPath", "-m", "/m/e.gguf"), &mut out);
    assert_eq!(out.get("EmbedModelPathCmd"), Some(&json!("-m")));
    assert_eq!(out.get("EmbedModelFullPathVal"), Some(&json!("/m/e.gguf")));
  }

  #[test]
  fn test_decode_present_only_touches_given_keys() {
    let raw = as_map(json!({ "TopKVal": "40", "Unrelated": 1 }));
    let values = decode_present(SliceKind::PrimaryEngine, &raw);
    assert_eq!(values, vec![("TopK", FieldValue::Text("40".to_string()))]);
  }

  #[test]
  fn test_decode_present_ignores_flag_keys_alone() {
    let raw = as_map(json!({ "TopKCmd": "--top-k", "MemLockCmd": "--mlock" }));
    assert!(decode_present(SliceKind::PrimaryEngine, &raw).is_empty());

    let raw = as_map(json!({ "MemLockCmdEnabled": "off" }));
    assert_eq!(
      decode_present(SliceKind::PrimaryEngine, &raw),
      vec![("MemLock", FieldValue::Enabled(false))]
    );
  }

  #[test]
  fn test_slice_kind_from_str() {
    assert_eq!("primary".parse::<SliceKind>(), Ok(SliceKind::PrimaryEngine));
    assert_eq!("app-paths".parse::<SliceKind>(), Ok(SliceKind::AppPaths));
    assert!("delete".parse::<SliceKind>().is_err());
  }
}
