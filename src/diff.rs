use crate::constants::{DIFF_DELETE_STYLE, DIFF_INSERT_STYLE};
use crate::errors::{report_error, AppError, ErrorEvent};
use crate::history::{SelectionWindow, WorkItem};
use crate::sanitize::{HtmlSanitizer, SanitizeProfile};
use regex::Regex;
use serde::{Deserialize, Serialize};
use similar::{ChangeTag, TextDiff};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, OnceLock};
use std::thread;
use tracing::{debug, info};

/// Which work-item member to compare.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffField {
  Prompt,
  #[default]
  Completion,
  Args,
}

impl DiffField {
  pub fn extract(self, item: &WorkItem) -> &str {
    match self {
      DiffField::Prompt => &item.prompt,
      DiffField::Completion => &item.completion,
      DiffField::Args => &item.args,
    }
  }
}

impl std::str::FromStr for DiffField {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "prompt" => Ok(DiffField::Prompt),
      "completion" => Ok(DiffField::Completion),
      "args" => Ok(DiffField::Args),
      other => Err(format!("unknown diff field: {other}")),
    }
  }
}

pub trait DiffEngine: Send + Sync {
  /// Markup describing the difference between two JSON-encoded values.
  fn diff(&self, left_json: &str, right_json: &str) -> Result<String, AppError>;
}

fn escape_diff_text(text: &str, out: &mut String) {
  for c in text.chars() {
    match c {
      '&' => out.push_str("&amp;"),
      '<' => out.push_str("&lt;"),
      '>' => out.push_str("&gt;"),
      '\n' => out.push_str("&para;<br>"),
      _ => out.push(c),
    }
  }
}

fn push_run(tag: ChangeTag, text: &str, out: &mut String) {
  if text.is_empty() {
    return;
  }
  let (open, close) = match tag {
    ChangeTag::Equal => ("<span>".to_string(), "</span>"),
    ChangeTag::Delete => (format!("<del style=\"{DIFF_DELETE_STYLE}\">"), "</del>"),
    ChangeTag::Insert => (format!("<ins style=\"{DIFF_INSERT_STYLE}\">"), "</ins>"),
  };
  out.push_str(&open);
  escape_diff_text(text, out);
  out.push_str(close);
}

/// Character-level diff rendered as highlighted HTML.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlDiffEngine;

impl HtmlDiffEngine {
  /// JSON string values are compared by their text; anything else as given.
  fn decode(value: &str) -> String {
    serde_json::from_str::<String>(value).unwrap_or_else(|_| value.to_string())
  }

  pub fn render(old: &str, new: &str) -> String {
    let diff = TextDiff::from_chars(old, new);
    let mut out = String::new();
    let mut run_tag = ChangeTag::Equal;
    let mut run = String::new();

    for change in diff.iter_all_changes() {
      if change.tag() != run_tag {
        push_run(run_tag, &run, &mut out);
        run.clear();
        run_tag = change.tag();
      }
      run.push_str(change.value());
    }
    push_run(run_tag, &run, &mut out);
    out
  }
}

impl DiffEngine for HtmlDiffEngine {
  fn diff(&self, left_json: &str, right_json: &str) -> Result<String, AppError> {
    Ok(Self::render(&Self::decode(left_json), &Self::decode(right_json)))
  }
}

fn regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
  cell.get_or_init(|| Regex::new(pattern).expect("valid cleaning regex"))
}

/// Plain preview of a stored value: braces, span tags, line breaks and
/// backslashes removed.
pub fn clean_text(text: &str) -> String {
  static BRACES: OnceLock<Regex> = OnceLock::new();
  static SPAN_OPEN: OnceLock<Regex> = OnceLock::new();
  static SPAN_CLOSE: OnceLock<Regex> = OnceLock::new();
  static ESCAPED_CRLF: OnceLock<Regex> = OnceLock::new();
  static NEWLINE: OnceLock<Regex> = OnceLock::new();

  let text = regex(&BRACES, r"[{}]").replace_all(text, "");
  let text = regex(&SPAN_OPEN, r"<span.*?>").replace_all(&text, "");
  let text = regex(&SPAN_CLOSE, r"</span>").replace_all(&text, "");
  let text = regex(&ESCAPED_CRLF, r"\\r\\n").replace_all(&text, " ");
  let text = regex(&NEWLINE, r"\r?\n").replace_all(&text, " ");
  text.replace('\\', "").trim().to_string()
}

/// Everything the engine needs, taken from the two selected items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffRequest {
  pub field: DiffField,
  pub left_idx: i64,
  pub right_idx: i64,
  pub left_json: String,
  pub right_json: String,
  pub left_text: String,
  pub right_text: String,
}

fn position_of(items: &[WorkItem], idx: i64) -> Result<usize, AppError> {
  items
    .iter()
    .position(|item| item.idx == idx)
    .ok_or_else(|| AppError::InvalidSelection(format!("no record with index {idx}")))
}

pub fn request_diff(
  window: &SelectionWindow,
  items: &[WorkItem],
  field: DiffField,
) -> Result<DiffRequest, AppError> {
  let &[first, second] = window.as_slice() else {
    return Err(AppError::InvalidSelection(format!(
      "{} record(s) selected, need 2",
      window.len()
    )));
  };
  // Left is whichever record comes first in the list, not in the selection.
  let (first, second) = (position_of(items, first)?, position_of(items, second)?);
  let (left_item, right_item) = (&items[first.min(second)], &items[first.max(second)]);
  let (left_idx, right_idx) = (left_item.idx, right_item.idx);
  let left = field.extract(left_item);
  let right = field.extract(right_item);

  let encode = |value: &str| {
    serde_json::to_string(value).map_err(|e| AppError::Diff(format!("cannot encode value: {e}")))
  };
  Ok(DiffRequest {
    field,
    left_idx,
    right_idx,
    left_json: encode(left)?,
    right_json: encode(right)?,
    left_text: clean_text(left),
    right_text: clean_text(right),
  })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffResult {
  pub left_idx: i64,
  pub right_idx: i64,
  /// Engine output as returned; never rendered directly.
  pub raw_markup: String,
  /// `raw_markup` after sanitizing; safe to render.
  pub html: String,
  pub left_text: String,
  pub right_text: String,
}

/// Outcome of a diff run on the worker thread.
#[derive(Debug)]
pub struct DiffCompletion {
  pub id: u64,
  pub request: DiffRequest,
  pub outcome: Result<String, AppError>,
}

#[derive(Debug, Default)]
pub struct DiffWorkflow {
  pub field: DiffField,
  result: Option<DiffResult>,
  show_result: bool,
  in_flight: Option<u64>,
  next_id: u64,
  last_error: Option<ErrorEvent>,
}

impl DiffWorkflow {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn result(&self) -> Option<&DiffResult> {
    self.result.as_ref()
  }

  pub fn is_showing_result(&self) -> bool {
    self.show_result
  }

  pub fn close_result(&mut self) {
    self.show_result = false;
  }

  pub fn is_in_flight(&self) -> bool {
    self.in_flight.is_some()
  }

  pub fn last_error(&self) -> Option<&ErrorEvent> {
    self.last_error.as_ref()
  }

  /// Run the engine on a worker thread. The caller passes what arrives on
  /// the returned channel to `complete`.
  pub fn submit(
    &mut self,
    window: &SelectionWindow,
    items: &[WorkItem],
    engine: Arc<dyn DiffEngine>,
  ) -> Result<Receiver<DiffCompletion>, AppError> {
    if self.in_flight.is_some() {
      return Err(AppError::Busy("a comparison is already running".to_string()));
    }
    let request = request_diff(window, items, self.field)?;
    self.next_id += 1;
    let id = self.next_id;
    self.in_flight = Some(id);
    info!("Comparing records {} and {}", request.left_idx, request.right_idx);

    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
      let outcome = engine.diff(&request.left_json, &request.right_json);
      if tx.send(DiffCompletion { id, request, outcome }).is_err() {
        debug!("Diff {} finished after its receiver was dropped", id);
      }
    });
    Ok(rx)
  }

  /// Apply a finished run. Late completions still replace the result.
  pub fn complete(
    &mut self,
    completion: DiffCompletion,
    sanitizer: &dyn HtmlSanitizer,
  ) -> Result<(), AppError> {
    if self.in_flight == Some(completion.id) {
      self.in_flight = None;
    }
    self.finish(completion.request, completion.outcome, sanitizer)
  }

  /// Block until the worker behind `rx` reports and apply its completion.
  /// A worker that went away without reporting frees the in-flight slot.
  pub fn wait(
    &mut self,
    rx: &Receiver<DiffCompletion>,
    sanitizer: &dyn HtmlSanitizer,
  ) -> Result<(), AppError> {
    match rx.recv() {
      Ok(completion) => self.complete(completion, sanitizer),
      Err(_) => {
        self.in_flight = None;
        let err = AppError::Diff("comparison stopped without a result".to_string());
        self.last_error = Some(report_error(err.clone(), Some("Failed to compare records")));
        Err(err)
      }
    }
  }

  /// Stop waiting for the running comparison so another can be submitted.
  /// Returns `false` when nothing was in flight.
  pub fn abandon(&mut self) -> bool {
    match self.in_flight.take() {
      Some(id) => {
        info!("Abandoned comparison {}", id);
        true
      }
      None => false,
    }
  }

  /// Request, run and apply in one go on the calling thread.
  pub fn run_blocking(
    &mut self,
    window: &SelectionWindow,
    items: &[WorkItem],
    engine: &dyn DiffEngine,
    sanitizer: &dyn HtmlSanitizer,
  ) -> Result<(), AppError> {
    if self.in_flight.is_some() {
      return Err(AppError::Busy("a comparison is already running".to_string()));
    }
    let request = request_diff(window, items, self.field)?;
    let outcome = engine.diff(&request.left_json, &request.right_json);
    self.finish(request, outcome, sanitizer)
  }

  fn finish(
    &mut self,
    request: DiffRequest,
    outcome: Result<String, AppError>,
    sanitizer: &dyn HtmlSanitizer,
  ) -> Result<(), AppError> {
    match outcome {
      Ok(raw_markup) => {
        let html = sanitizer.sanitize(&raw_markup, SanitizeProfile::HtmlInline);
        self.result = Some(DiffResult {
          left_idx: request.left_idx,
          right_idx: request.right_idx,
          raw_markup,
          html,
          left_text: request.left_text,
          right_text: request.right_text,
        });
        self.show_result = true;
        self.last_error = None;
        Ok(())
      }
      Err(err) => {
        self.last_error = Some(report_error(err.clone(), Some("Failed to compare records")));
        Err(err)
      }
    }
  }
}
