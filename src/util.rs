use std::time::{SystemTime, UNIX_EPOCH};

pub(crate) fn now_ms() -> u64 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .map(|d| d.as_millis() as u64)
    .unwrap_or(0)
}

/// Rewrites Windows folder separators to `/` so paths from the lister and
/// from persisted settings compare equal.
pub fn normalize_separators(path: &str) -> String {
  path.replace('\\', "/")
}

/// Everything after the first `n` characters, or "" when shorter.
pub(crate) fn skip_chars(value: &str, n: usize) -> &str {
  match value.char_indices().nth(n) {
    Some((offset, _)) => &value[offset..],
    None => "",
  }
}

/// Run `f` with a plain-text subscriber and return everything it logged.
#[cfg(test)]
pub(crate) fn capture_logs(f: impl FnOnce()) -> String {
  use std::io;
  use std::sync::{Arc, Mutex};

  #[derive(Clone)]
  struct SharedBuf(Arc<Mutex<Vec<u8>>>);

  impl io::Write for SharedBuf {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
      self.0.lock().unwrap().extend_from_slice(data);
      Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
      Ok(())
    }
  }

  let buf = SharedBuf(Arc::new(Mutex::new(Vec::new())));
  let writer = buf.clone();
  let subscriber = tracing_subscriber::fmt()
    .with_writer(move || writer.clone())
    .with_ansi(false)
    .with_max_level(tracing::Level::TRACE)
    .finish();
  tracing::subscriber::with_default(subscriber, f);

  let bytes = buf.0.lock().unwrap().clone();
  String::from_utf8_lossy(&bytes).into_owned()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_normalize_separators() {
    assert_eq!(normalize_separators(r"C:\models\llama.gguf"), "C:/models/llama.gguf");
    assert_eq!(normalize_separators("/models/llama.gguf"), "/models/llama.gguf");
  }

  #[test]
  fn test_skip_chars_multibyte() {
    assert_eq!(skip_chars("äbc", 1), "bc");
    assert_eq!(skip_chars("ab", 2), "");
    assert_eq!(skip_chars("ab", 5), "");
  }
}
