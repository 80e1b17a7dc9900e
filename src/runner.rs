// Inference runner
// Spawns the engine binary for a settings slice and tracks the single
// request that may be in flight.

use chrono::{DateTime, Local};
use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

use crate::errors::{report_error, AppError, ErrorEvent};
use crate::paths::resolve_engine_binary;
use crate::state::SettingsSlice;

/// Number of stderr characters kept in a failure message.
const STDERR_TAIL_CHARS: usize = 400;

/// Runs are keyed by the caller's run id so a cancel only reaches the run it
/// was issued for.
pub trait CommandRunner: Send + Sync {
  fn run(&self, run_id: u64, settings: &SettingsSlice) -> Result<String, AppError>;
  fn cancel(&self, run_id: u64) -> Result<(), AppError>;
}

/// Turns a slice into the engine's argument list. Supplied by the host.
pub type ArgsBuilder = Box<dyn Fn(&SettingsSlice) -> Vec<String> + Send + Sync>;

#[derive(Default)]
struct RunTable {
  active: HashMap<u64, Child>,
  // Ids cancelled while running, or before their process was registered.
  cancelled: HashSet<u64>,
}

pub struct ProcessRunner {
  binary: PathBuf,
  args_builder: ArgsBuilder,
  runs: Mutex<RunTable>,
}

impl ProcessRunner {
  pub fn new(binary: impl Into<PathBuf>, args_builder: ArgsBuilder) -> Self {
    Self {
      binary: binary.into(),
      args_builder,
      runs: Mutex::new(RunTable::default()),
    }
  }

  /// Runner for the binary configured in the app-paths slice.
  pub fn from_configured(configured: &str, args_builder: ArgsBuilder) -> Result<Self, AppError> {
    let binary = resolve_engine_binary(configured)
      .ok_or_else(|| AppError::Runner(format!("engine binary not found: {configured:?}")))?;
    Ok(Self::new(binary, args_builder))
  }

  pub fn binary(&self) -> &PathBuf {
    &self.binary
  }

  fn lock_runs(&self) -> Result<MutexGuard<'_, RunTable>, AppError> {
    self
      .runs
      .lock()
      .map_err(|_| AppError::Runner("process table lock poisoned".to_string()))
  }

  #[cfg(test)]
  fn running_count(&self) -> usize {
    self.lock_runs().map(|runs| runs.active.len()).unwrap_or(0)
  }
}

fn tail(text: &str, max_chars: usize) -> &str {
  let count = text.chars().count();
  if count <= max_chars {
    return text.trim();
  }
  crate::util::skip_chars(text, count - max_chars).trim()
}

fn cancelled_error() -> AppError {
  AppError::Runner("engine run was cancelled".to_string())
}

impl CommandRunner for ProcessRunner {
  fn run(&self, run_id: u64, settings: &SettingsSlice) -> Result<String, AppError> {
    let args = (self.args_builder)(settings);
    let mut command = Command::new(&self.binary);
    command
      .args(&args)
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped());

    #[cfg(target_os = "windows")]
    {
      use std::os::windows::process::CommandExt;
      command.creation_flags(0x08000000); // CREATE_NO_WINDOW
    }

    let mut child = command
      .spawn()
      .map_err(|e| AppError::Runner(format!("Failed to start {}: {}", self.binary.display(), e)))?;
    info!(
      "Engine run {} started (PID: {}) with {} argument(s)",
      run_id,
      child.id(),
      args.len()
    );

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    {
      let mut runs = self.lock_runs()?;
      if runs.cancelled.contains(&run_id) {
        debug!("Engine run {} was cancelled before it started", run_id);
        let _ = child.kill();
      }
      runs.active.insert(run_id, child);
    }

    let stderr_reader = thread::spawn(move || {
      let mut text = String::new();
      if let Some(mut pipe) = stderr {
        let _ = pipe.read_to_string(&mut text);
      }
      text
    });

    let mut output = String::new();
    if let Some(mut pipe) = stdout {
      if let Err(e) = pipe.read_to_string(&mut output) {
        warn!("Failed to read engine output: {}", e);
      }
    }
    let stderr_text = stderr_reader.join().unwrap_or_default();

    let (finished, was_cancelled) = {
      let mut runs = self.lock_runs()?;
      (runs.active.remove(&run_id), runs.cancelled.remove(&run_id))
    };
    let Some(mut child) = finished else {
      return Err(AppError::Runner(format!("engine run {run_id} lost its process handle")));
    };
    let status = child
      .wait()
      .map_err(|e| AppError::Runner(format!("Failed to wait for engine: {}", e)))?;

    if was_cancelled {
      return Err(cancelled_error());
    }
    if !status.success() {
      return Err(AppError::Runner(format!(
        "engine exited with {}: {}",
        status,
        tail(&stderr_text, STDERR_TAIL_CHARS)
      )));
    }
    debug!("Engine run {} produced {} byte(s)", run_id, output.len());
    Ok(output)
  }

  fn cancel(&self, run_id: u64) -> Result<(), AppError> {
    let mut runs = self.lock_runs()?;
    runs.cancelled.insert(run_id);
    let Some(child) = runs.active.get_mut(&run_id) else {
      debug!("Cancel for engine run {} arrived before its process", run_id);
      return Ok(());
    };
    info!("Stopping engine run {} (PID: {})...", run_id, child.id());
    child
      .kill()
      .map_err(|e| AppError::Runner(format!("Failed to stop engine: {}", e)))
  }
}

#[derive(Debug, Clone)]
pub struct InferenceOutput {
  pub request_id: u64,
  pub text: String,
  pub finished_at: DateTime<Local>,
}

#[derive(Debug)]
pub struct RunCompletion {
  pub id: u64,
  pub outcome: Result<String, AppError>,
}

/// Processing indicator and in-flight tracking around a runner.
pub struct InferenceSession {
  runner: Arc<dyn CommandRunner>,
  processing: bool,
  current: Option<u64>,
  next_id: u64,
  last_output: Option<InferenceOutput>,
  last_error: Option<ErrorEvent>,
}

impl InferenceSession {
  pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
    Self {
      runner,
      processing: false,
      current: None,
      next_id: 0,
      last_output: None,
      last_error: None,
    }
  }

  pub fn is_processing(&self) -> bool {
    self.processing
  }

  pub fn last_output(&self) -> Option<&InferenceOutput> {
    self.last_output.as_ref()
  }

  pub fn last_error(&self) -> Option<&ErrorEvent> {
    self.last_error.as_ref()
  }

  pub fn submit(&mut self, settings: SettingsSlice) -> Result<Receiver<RunCompletion>, AppError> {
    if self.processing {
      return Err(AppError::Busy("inference is already running".to_string()));
    }
    self.next_id += 1;
    let id = self.next_id;
    self.current = Some(id);
    self.processing = true;
    self.last_error = None;

    let runner = Arc::clone(&self.runner);
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
      let outcome = runner.run(id, &settings);
      if tx.send(RunCompletion { id, outcome }).is_err() {
        debug!("Inference {} finished after its receiver was dropped", id);
      }
    });
    Ok(rx)
  }

  /// Apply a completion. Returns `false` when it belongs to a cancelled or
  /// superseded request and was ignored.
  pub fn complete(&mut self, completion: RunCompletion) -> bool {
    if self.current != Some(completion.id) {
      debug!("Ignoring stale inference result {}", completion.id);
      return false;
    }
    self.current = None;
    self.processing = false;
    match completion.outcome {
      Ok(text) => {
        self.last_output = Some(InferenceOutput {
          request_id: completion.id,
          text,
          finished_at: Local::now(),
        });
      }
      Err(err) => {
        self.last_error = Some(report_error(err, Some("Failed to run inference")));
      }
    }
    true
  }

  /// Clear the indicator now and stop the in-flight engine run in the
  /// background. `None` when nothing was running.
  pub fn cancel(&mut self) -> Option<JoinHandle<()>> {
    self.processing = false;
    let id = self.current.take()?;
    let runner = Arc::clone(&self.runner);
    Some(thread::spawn(move || {
      if let Err(err) = runner.cancel(id) {
        warn!("Cancel of run {} was not acknowledged: {}", id, err);
      }
    }))
  }
}
