use serde::{Deserialize, Serialize};
use std::fmt;

/// Application-wide error types with categories for better error handling
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum AppError {
  /// A field name that is not part of the slice catalog
  UnknownField(String),

  /// A slice was read or written before its defaults were loaded
  Uninitialized(String),

  /// A second attempt to populate a slice from defaults
  AlreadyInitialized(String),

  /// Update kind the store does not support (delete, wrong value type, ...)
  UnsupportedUpdate(String),

  /// Diff requested without exactly two selected work items
  InvalidSelection(String),

  /// Default settings could not be loaded
  Settings(String),

  /// Model folder listing failed
  Model(String),

  /// Diff engine failed
  Diff(String),

  /// Inference process failed to start, run, or cancel
  Runner(String),

  /// History or settings file could not be read
  Storage(String),

  /// Required fields are missing or too short
  Validation(String),

  /// A request to the same collaborator is still in flight
  Busy(String),

  /// Generic errors that don't fit other categories
  Other(String),
}

impl fmt::Display for AppError {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match self {
      AppError::UnknownField(msg) => write!(f, "Unknown Field: {}", msg),
      AppError::Uninitialized(msg) => write!(f, "Settings Not Initialized: {}", msg),
      AppError::AlreadyInitialized(msg) => write!(f, "Settings Already Initialized: {}", msg),
      AppError::UnsupportedUpdate(msg) => write!(f, "Unsupported Update: {}", msg),
      AppError::InvalidSelection(msg) => write!(f, "Invalid Selection: {}", msg),
      AppError::Settings(msg) => write!(f, "Settings Error: {}", msg),
      AppError::Model(msg) => write!(f, "Model Error: {}", msg),
      AppError::Diff(msg) => write!(f, "Diff Error: {}", msg),
      AppError::Runner(msg) => write!(f, "Runner Error: {}", msg),
      AppError::Storage(msg) => write!(f, "Storage Error: {}", msg),
      AppError::Validation(msg) => write!(f, "Validation Error: {}", msg),
      AppError::Busy(msg) => write!(f, "Busy: {}", msg),
      AppError::Other(msg) => write!(f, "Error: {}", msg),
    }
  }
}

impl std::error::Error for AppError {}

impl AppError {
  /// Returns a user-friendly title for the error
  pub fn title(&self) -> &str {
    match self {
      AppError::UnknownField(_) => "Unknown Setting",
      AppError::Uninitialized(_) => "Settings Not Loaded",
      AppError::AlreadyInitialized(_) => "Settings Already Loaded",
      AppError::UnsupportedUpdate(_) => "Unsupported Update",
      AppError::InvalidSelection(_) => "Select Two Records",
      AppError::Settings(_) => "Settings Error",
      AppError::Model(_) => "Model Problem",
      AppError::Diff(_) => "Comparison Failed",
      AppError::Runner(_) => "Inference Failed",
      AppError::Storage(_) => "Storage Error",
      AppError::Validation(_) => "Invalid Settings",
      AppError::Busy(_) => "Still Working",
      AppError::Other(_) => "Error",
    }
  }

  /// Returns the error message
  pub fn message(&self) -> &str {
    match self {
      AppError::UnknownField(msg)
      | AppError::Uninitialized(msg)
      | AppError::AlreadyInitialized(msg)
      | AppError::UnsupportedUpdate(msg)
      | AppError::InvalidSelection(msg)
      | AppError::Settings(msg)
      | AppError::Model(msg)
      | AppError::Diff(msg)
      | AppError::Runner(msg)
      | AppError::Storage(msg)
      | AppError::Validation(msg)
      | AppError::Busy(msg)
      | AppError::Other(msg) => msg,
    }
  }

  /// Returns whether this error is recoverable (can be retried).
  /// Programming errors are never recoverable.
  pub fn is_recoverable(&self) -> bool {
    match self {
      AppError::UnknownField(_) => false,
      AppError::Uninitialized(_) => false,
      AppError::AlreadyInitialized(_) => false,
      AppError::UnsupportedUpdate(_) => false,
      AppError::InvalidSelection(_) => true,
      AppError::Settings(_) => true,
      AppError::Model(_) => true, // Folder may appear later
      AppError::Diff(_) => true,
      AppError::Runner(_) => true,
      AppError::Storage(_) => true,
      AppError::Validation(_) => true, // User keeps editing
      AppError::Busy(_) => true,
      AppError::Other(_) => false,
    }
  }

  /// Returns a suggested action for the user
  pub fn suggested_action(&self) -> Option<&str> {
    match self {
      AppError::InvalidSelection(_) => Some("Select exactly two records to compare"),
      AppError::Settings(_) => Some("Check the default settings file and try again"),
      AppError::Model(_) => Some("Check the model folder path"),
      AppError::Diff(_) => Some("Try the comparison again"),
      AppError::Runner(_) => Some("Check the inference binary path and model settings"),
      AppError::Storage(_) => Some("Check disk space and permissions"),
      AppError::Validation(_) => Some("Fill in the highlighted fields"),
      AppError::Busy(_) => Some("Wait for the current request to finish"),
      _ => None,
    }
  }
}

/// Convert from String to AppError::Other
impl From<String> for AppError {
  fn from(error: String) -> Self {
    AppError::Other(error)
  }
}

/// Convert from &str to AppError::Other
impl From<&str> for AppError {
  fn from(error: &str) -> Self {
    AppError::Other(error.to_string())
  }
}

/// Error payload surfaced inline next to the pending interaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEvent {
  pub error: AppError,
  pub timestamp: u64,
  pub context: Option<String>,
}

impl ErrorEvent {
  pub fn new(error: AppError) -> Self {
    Self {
      error,
      timestamp: crate::util::now_ms(),
      context: None,
    }
  }

  pub fn with_context(mut self, context: impl Into<String>) -> Self {
    self.context = Some(context.into());
    self
  }

  /// Inline message in the "Failed to ...: reason" shape
  pub fn inline_message(&self) -> String {
    match &self.context {
      Some(ctx) => format!("{}: {}", ctx, self.error.message()),
      None => self.error.to_string(),
    }
  }
}

/// Log the error and wrap it for inline display.
pub(crate) fn report_error(error: AppError, context: Option<&str>) -> ErrorEvent {
  let event = if let Some(ctx) = context {
    ErrorEvent::new(error.clone()).with_context(ctx)
  } else {
    ErrorEvent::new(error.clone())
  };

  tracing::error!("{}: {}", error.title(), event.inline_message());

  event
}

/// Log a failed store or command call and pass the error on unchanged.
pub(crate) fn log_failure<T>(result: Result<T, AppError>, context: &str) -> Result<T, AppError> {
  result.map_err(|err| {
    report_error(err.clone(), Some(context));
    err
  })
}
