// Derived path fields
//
// A derived field's value is a base folder from the app-paths slice followed
// by a suffix. Programmatic writes build it from scratch; user edits are
// reconciled so the base folder stays in front.

use crate::util::skip_chars;

/// Which app-paths folder a derived field hangs off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DerivedBinding {
  /// Field in the engine slice holding the derived value.
  pub field: &'static str,
  /// App-paths field holding the base folder.
  pub base_folder: &'static str,
}

pub fn compute_derived(base_folder: &str, suffix: &str) -> String {
  let mut out = String::with_capacity(base_folder.len() + suffix.len());
  out.push_str(base_folder);
  out.push_str(suffix);
  out
}

/// Rebuild a user-edited value so it starts with `base_folder`.
///
/// Everything beyond the first `base_folder.chars().count()` characters of
/// the input is kept as the suffix. Input no longer than the base folder is
/// treated as a suffix in full, so typing `x` over `/a/b/` gives `/a/b/x`.
pub fn reconcile_on_edit(base_folder: &str, new_input: &str) -> String {
  if new_input.is_empty() {
    return String::new();
  }
  let base_len = base_folder.chars().count();
  if new_input.chars().count() <= base_len {
    compute_derived(base_folder, new_input)
  } else {
    compute_derived(base_folder, skip_chars(new_input, base_len))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_compute_derived_example() {
    assert_eq!(
      compute_derived("/models/logs/", "llama-7b.log"),
      "/models/logs/llama-7b.log"
    );
  }

  #[test]
  fn test_compute_derived_prefix_and_suffix() {
    let cases = [("", ""), ("/a/", "b"), ("C:/x/", "ü.log"), ("base", "")];
    for (base, suffix) in cases {
      let out = compute_derived(base, suffix);
      assert!(out.starts_with(base));
      assert!(out.ends_with(suffix));
      assert_eq!(out.len(), base.len() + suffix.len());
    }
  }

  #[test]
  fn test_reconcile_keeps_base_prefix() {
    let base = "/models/logs/";
    let v = "/models/logs/new.log";
    let out = reconcile_on_edit(base, v);
    assert!(out.starts_with(base));
    assert_eq!(out, "/models/logs/new.log");
  }

  #[test]
  fn test_reconcile_replaces_mangled_prefix() {
    // The user overtyped part of the folder; the folder is restored.
    let out = reconcile_on_edit("/models/logs/", "/models/lXgs/run.log");
    assert_eq!(out, "/models/logs/run.log");
  }

  #[test]
  fn test_reconcile_is_idempotent() {
    let base = "/data/cache/";
    for v in ["/data/cache/a.bin", "zzzzzzzzzzzzzzzz.bin", "/data/cache/"] {
      if v.chars().count() <= base.chars().count() {
        continue;
      }
      let once = reconcile_on_edit(base, v);
      assert_eq!(reconcile_on_edit(base, &once), once);
    }
  }

  #[test]
  fn test_reconcile_suffix_property() {
    let base = "/b/";
    let v = "xyzw.log";
    let out = reconcile_on_edit(base, v);
    assert!(out.ends_with(&v[3..]));
    assert_eq!(out, "/b/w.log");
  }

  #[test]
  fn test_reconcile_short_input_is_appended() {
    assert_eq!(reconcile_on_edit("/models/logs/", "x"), "/models/logs/x");
    assert_eq!(reconcile_on_edit("/ab/", "/ab/"), "/ab//ab/");
  }

  #[test]
  fn test_reconcile_empty_input_clears() {
    assert_eq!(reconcile_on_edit("/models/logs/", ""), "");
  }

  #[test]
  fn test_reconcile_counts_characters() {
    let base = "/mödels/";
    let out = reconcile_on_edit(base, "/mödels/ä.log");
    assert_eq!(out, "/mödels/ä.log");
  }
}
