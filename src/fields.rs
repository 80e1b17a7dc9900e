// Field model
//
// A settings slice is a flat bag of fields. Each field is either a plain
// text value, a command-line flag with an argument, or a flag that is simply
// switched on or off. The flag text (`cmd_token`) is fixed when the slice is
// populated; only the argument or the on/off state changes afterwards.

use serde::{Deserialize, Serialize};

use crate::errors::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
  Plain,
  FlagValue,
  FlagToggle,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Field {
  PlainValue {
    name: String,
    value: String,
  },
  FlagValuePair {
    name: String,
    cmd_token: String,
    value: String,
  },
  FlagTogglePair {
    name: String,
    cmd_token: String,
    enabled: bool,
  },
}

/// The mutable part of a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
  Text(String),
  Enabled(bool),
}

impl From<&str> for FieldValue {
  fn from(value: &str) -> Self {
    FieldValue::Text(value.to_string())
  }
}

impl From<String> for FieldValue {
  fn from(value: String) -> Self {
    FieldValue::Text(value)
  }
}

impl From<bool> for FieldValue {
  fn from(value: bool) -> Self {
    FieldValue::Enabled(value)
  }
}

impl Field {
  pub fn plain(name: &str, value: &str) -> Self {
    Field::PlainValue {
      name: name.to_string(),
      value: value.to_string(),
    }
  }

  pub fn flag_value(name: &str, cmd_token: &str, value: &str) -> Self {
    Field::FlagValuePair {
      name: name.to_string(),
      cmd_token: cmd_token.to_string(),
      value: value.to_string(),
    }
  }

  pub fn flag_toggle(name: &str, cmd_token: &str, enabled: bool) -> Self {
    Field::FlagTogglePair {
      name: name.to_string(),
      cmd_token: cmd_token.to_string(),
      enabled,
    }
  }

  pub fn name(&self) -> &str {
    match self {
      Field::PlainValue { name, .. }
      | Field::FlagValuePair { name, .. }
      | Field::FlagTogglePair { name, .. } => name,
    }
  }

  pub fn kind(&self) -> FieldKind {
    match self {
      Field::PlainValue { .. } => FieldKind::Plain,
      Field::FlagValuePair { .. } => FieldKind::FlagValue,
      Field::FlagTogglePair { .. } => FieldKind::FlagToggle,
    }
  }

  pub fn cmd_token(&self) -> Option<&str> {
    match self {
      Field::PlainValue { .. } => None,
      Field::FlagValuePair { cmd_token, .. } | Field::FlagTogglePair { cmd_token, .. } => {
        Some(cmd_token)
      }
    }
  }

  /// Text of a plain or flag/value field; `None` for toggles.
  pub fn text(&self) -> Option<&str> {
    match self {
      Field::PlainValue { value, .. } | Field::FlagValuePair { value, .. } => Some(value),
      Field::FlagTogglePair { .. } => None,
    }
  }

  /// On/off state of a toggle; `None` for text fields.
  pub fn enabled(&self) -> Option<bool> {
    match self {
      Field::FlagTogglePair { enabled, .. } => Some(*enabled),
      _ => None,
    }
  }

  pub fn current_value(&self) -> FieldValue {
    match self {
      Field::PlainValue { value, .. } | Field::FlagValuePair { value, .. } => {
        FieldValue::Text(value.clone())
      }
      Field::FlagTogglePair { enabled, .. } => FieldValue::Enabled(*enabled),
    }
  }

  /// Replace the mutable part in place. Name and flag text are untouched.
  pub fn set_value(&mut self, new_value: FieldValue) -> Result<(), AppError> {
    match (self, new_value) {
      (Field::PlainValue { value, .. }, FieldValue::Text(text))
      | (Field::FlagValuePair { value, .. }, FieldValue::Text(text)) => {
        *value = text;
        Ok(())
      }
      (Field::FlagTogglePair { enabled, .. }, FieldValue::Enabled(flag)) => {
        *enabled = flag;
        Ok(())
      }
      (field, FieldValue::Text(_)) => Err(AppError::UnsupportedUpdate(format!(
        "{} is a toggle and takes an on/off value",
        field.name()
      ))),
      (field, FieldValue::Enabled(_)) => Err(AppError::UnsupportedUpdate(format!(
        "{} holds text and cannot be toggled",
        field.name()
      ))),
    }
  }
}
