//! Escaping for text and attributes placed in the widget markup.

/// Escape text for use inside HTML element content.
pub fn esc_html(s: &str) -> String {
  let mut out = String::with_capacity(s.len());
  for c in s.chars() {
    match c {
      '&' => out.push_str("&amp;"),
      '<' => out.push_str("&lt;"),
      '>' => out.push_str("&gt;"),
      '"' => out.push_str("&quot;"),
      '\'' => out.push_str("&#039;"),
      _ => out.push(c),
    }
  }
  out
}

/// Escape text for use inside a quoted HTML attribute.
pub fn esc_attr(s: &str) -> String {
  esc_html(s)
}

/// Remove anything that looks like a markup tag.
pub fn strip_tags(s: &str) -> String {
  let mut out = String::with_capacity(s.len());
  let mut in_tag = false;
  for c in s.chars() {
    match c {
      '<' => in_tag = true,
      '>' if in_tag => in_tag = false,
      _ if !in_tag => out.push(c),
      _ => {}
    }
  }
  out
}
