//! Small utility helpers used across modules.

/// Very small and safe string templating.
/// Replaces occurrences of `{key}` in the template with provided values.
pub fn fill_template(tpl: &str, pairs: &[(&str, &str)]) -> String {
  let mut out = tpl.to_string();
  for (k, v) in pairs {
    let needle = format!("{{{}}}", k);
    out = out.replace(&needle, v);
  }
  out
}

/// Log-safe truncation for large strings.
/// Avoids spamming logs with huge request/response payloads.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.len() <= max {
    return s.to_string();
  }
  let mut cut = max;
  while !s.is_char_boundary(cut) { cut -= 1; }
  format!("{}… ({} bytes total)", &s[..cut], s.len())
}

/// Pull the outermost `{ ... }` block out of a model reply.
/// Models sometimes wrap JSON in markdown fences or a sentence of preamble.
pub fn extract_json_object(raw: &str) -> Option<&str> {
  let start = raw.find('{')?;
  let end = raw.rfind('}')?;
  if end < start { return None; }
  Some(&raw[start..=end])
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn fill_template_replaces_every_key() {
    let out = fill_template("{a} and {b} then {a}", &[("a", "x"), ("b", "y")]);
    assert_eq!(out, "x and y then x");
  }

  #[test]
  fn trunc_for_log_respects_char_boundaries() {
    let s = "ééééé";
    let t = trunc_for_log(s, 3);
    assert!(t.starts_with('é'));
    assert!(t.ends_with("(10 bytes total)"));
  }

  #[test]
  fn extracts_json_from_fenced_reply() {
    let raw = "Here you go:\n```json\n{\"a\": {\"b\": 1}}\n```";
    assert_eq!(extract_json_object(raw), Some("{\"a\": {\"b\": 1}}"));
    assert_eq!(extract_json_object("no json here"), None);
  }
}
