// Inline HTML sanitizer
//
// Diff markup is rendered as HTML, so it always passes through here first.
// Only a small set of inline formatting tags survives, with `class` and a
// plain `style` as the sole attributes. Everything else is either dropped
// with its content (script-like elements) or unwrapped to its text.

use regex::Regex;
use std::fmt::Write as _;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SanitizeProfile {
  HtmlInline,
}

pub trait HtmlSanitizer {
  fn sanitize(&self, markup: &str, profile: SanitizeProfile) -> String;
}

const INLINE_TAGS: &[&str] = &[
  "span", "del", "ins", "b", "strong", "i", "em", "u", "s", "code", "mark", "sub", "sup", "small",
  "br",
];

const VOID_TAGS: &[&str] = &["br"];

const DROP_WITH_CONTENT: &[&str] = &[
  "script", "style", "iframe", "object", "embed", "noscript", "template", "textarea", "title",
];

fn token_re() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| {
    Regex::new(r"(?s)<!--.*?(?:-->|\z)|</?[A-Za-z][^<>]*>").expect("valid token regex")
  })
}

fn tag_re() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| {
    Regex::new(r"(?s)^<(/?)([A-Za-z][A-Za-z0-9]*)(.*?)(/?)>$").expect("valid tag regex")
  })
}

fn attr_re() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| {
    Regex::new(r#"([A-Za-z_:][-A-Za-z0-9_:.]*)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+)))?"#)
      .expect("valid attribute regex")
  })
}

fn style_re() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| {
    Regex::new(r"^\s*(?:[-A-Za-z]+\s*:\s*[-#A-Za-z0-9 .,%]+\s*;?\s*)*$").expect("valid style regex")
  })
}

fn entity_re() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| {
    Regex::new(r"^&(?:[A-Za-z][A-Za-z0-9]*|#[0-9]+|#[xX][0-9A-Fa-f]+);").expect("valid entity regex")
  })
}

/// Escape `<`, `>` and bare `&`. Existing entities are left as they are.
fn escape_text_into(text: &str, out: &mut String) {
  for (i, c) in text.char_indices() {
    match c {
      '<' => out.push_str("&lt;"),
      '>' => out.push_str("&gt;"),
      '&' if !entity_re().is_match(&text[i..]) => out.push_str("&amp;"),
      _ => out.push(c),
    }
  }
}

fn escape_attr(value: &str) -> String {
  let mut out = String::with_capacity(value.len());
  escape_text_into(value, &mut out);
  out.replace('"', "&quot;")
}

fn push_attributes(raw: &str, out: &mut String) {
  for caps in attr_re().captures_iter(raw) {
    let name = caps[1].to_ascii_lowercase();
    let value = caps
      .get(2)
      .or_else(|| caps.get(3))
      .or_else(|| caps.get(4))
      .map(|m| m.as_str())
      .unwrap_or("");
    let keep = match name.as_str() {
      "class" => true,
      "style" => style_re().is_match(value),
      _ => false,
    };
    if keep {
      let _ = write!(out, " {}=\"{}\"", name, escape_attr(value));
    }
  }
}

fn sanitize_inline(markup: &str) -> String {
  let mut out = String::with_capacity(markup.len());
  let mut open: Vec<&'static str> = Vec::new();
  let mut skipping: Option<String> = None;
  let mut last = 0;

  for token in token_re().find_iter(markup) {
    if skipping.is_none() {
      escape_text_into(&markup[last..token.start()], &mut out);
    }
    last = token.end();

    if token.as_str().starts_with("<!--") {
      continue;
    }
    let Some(caps) = tag_re().captures(token.as_str()) else {
      continue;
    };
    let closing = !caps[1].is_empty();
    let self_closing = !caps[4].is_empty();
    let name = caps[2].to_ascii_lowercase();

    if let Some(dropped) = &skipping {
      if closing && *dropped == name {
        skipping = None;
      }
      continue;
    }
    if DROP_WITH_CONTENT.contains(&name.as_str()) {
      if !closing && !self_closing {
        skipping = Some(name);
      }
      continue;
    }
    let Some(tag) = INLINE_TAGS.iter().copied().find(|t| *t == name) else {
      continue;
    };

    if closing {
      if let Some(pos) = open.iter().rposition(|t| *t == tag) {
        for t in open.drain(pos..).rev() {
          let _ = write!(out, "</{}>", t);
        }
      }
      continue;
    }

    out.push('<');
    out.push_str(tag);
    push_attributes(&caps[3], &mut out);
    out.push('>');
    if VOID_TAGS.contains(&tag) {
      continue;
    }
    if self_closing {
      let _ = write!(out, "</{}>", tag);
    } else {
      open.push(tag);
    }
  }

  if skipping.is_none() {
    escape_text_into(&markup[last..], &mut out);
  }
  for t in open.iter().rev() {
    let _ = write!(out, "</{}>", t);
  }
  out
}

#[derive(Debug, Clone, Copy, Default)]
pub struct InlineHtmlSanitizer;

impl HtmlSanitizer for InlineHtmlSanitizer {
  fn sanitize(&self, markup: &str, profile: SanitizeProfile) -> String {
    match profile {
      SanitizeProfile::HtmlInline => sanitize_inline(markup),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn clean(markup: &str) -> String {
    InlineHtmlSanitizer.sanitize(markup, SanitizeProfile::HtmlInline)
  }

  #[test]
  fn test_diff_markup_passes_through() {
    let markup = r#"<span>a</span><del style="background:#ffe6e6;">b</del><ins style="background:#e6ffe6;">c&para;<br></ins>"#;
    assert_eq!(clean(markup), markup);
  }

  #[test]
  fn test_script_content_is_dropped() {
    assert_eq!(clean("a<script>alert(1)</script>b"), "ab");
    assert_eq!(clean("a<SCRIPT type=x>alert(1)</Script>b"), "ab");
    assert_eq!(clean("x<style>*{}</style>"), "x");
  }

  #[test]
  fn test_attributes_are_filtered() {
    assert_eq!(
      clean(r#"<span onclick="steal()" class="k">t</span>"#),
      r#"<span class="k">t</span>"#
    );
    assert_eq!(
      clean(r#"<span style="background:url(javascript:x)">t</span>"#),
      "<span>t</span>"
    );
  }

  #[test]
  fn test_unknown_tags_are_unwrapped() {
    assert_eq!(clean("<div><b>x</b></div>"), "<b>x</b>");
    assert_eq!(clean(r#"<a href="javascript:x">link</a>"#), "link");
    assert_eq!(clean(r#"<img src=x onerror=alert(1)>"#), "");
  }

  #[test]
  fn test_unbalanced_tags() {
    assert_eq!(clean("<b>x"), "<b>x</b>");
    assert_eq!(clean("<b><i>x</b>y</i>"), "<b><i>x</i></b>y");
    assert_eq!(clean("x</em>"), "x");
  }

  #[test]
  fn test_text_is_escaped_once() {
    assert_eq!(clean("1 < 2 & 3 > 0"), "1 &lt; 2 &amp; 3 &gt; 0");
    assert_eq!(clean("a &amp; b &#39; c"), "a &amp; b &#39; c");
  }

  #[test]
  fn test_comments_are_removed() {
    assert_eq!(clean("a<!-- <b>x</b> -->b"), "ab");
    assert_eq!(clean("a<!-- open"), "a");
  }
}
