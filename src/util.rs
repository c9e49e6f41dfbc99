//! Small utility helpers used across modules.

/// Very small and safe string templating.
/// Replaces occurrences of `{key}` in the template with provided values.
/// This is intentionally simple (no nested/conditional logic).
pub fn fill_template(tpl: &str, pairs: &[(&str, &str)]) -> String {
  let mut out = tpl.to_string();
  for (k, v) in pairs {
    let needle = format!("{{{}}}", k);
    out = out.replace(&needle, v);
  }
  out
}

/// Log-safe truncation for large strings, cut on a char boundary.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.len() <= max {
    return s.to_string();
  }
  let mut end = max;
  while !s.is_char_boundary(end) {
    end -= 1;
  }
  format!("{}… ({} bytes total)", &s[..end], s.len())
}

/// Wall-clock milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
  chrono::Utc::now().timestamp_millis()
}

/// "1m 5s" / "42s", as shown on the profile card.
pub fn format_play_time(total_seconds: f64) -> String {
  let total = total_seconds.max(0.0).floor() as u64;
  let (mins, secs) = (total / 60, total % 60);
  if mins > 0 { format!("{mins}m {secs}s") } else { format!("{secs}s") }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn template_replaces_known_keys_only() {
    let out = fill_template("{a} y {b} {\"json\": 1}", &[("a", "uno"), ("b", "dos")]);
    assert_eq!(out, "uno y dos {\"json\": 1}");
  }

  #[test]
  fn truncation_respects_char_boundaries() {
    let s = "ñññññ";
    let t = trunc_for_log(s, 3);
    assert!(t.starts_with('ñ'));
    assert!(t.contains("10 bytes total"));
    assert_eq!(trunc_for_log("abc", 10), "abc");
  }

  #[test]
  fn play_time_format() {
    assert_eq!(format_play_time(42.9), "42s");
    assert_eq!(format_play_time(65.0), "1m 5s");
  }
}
