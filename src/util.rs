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

/// Format whole seconds as `m:ss` (minutes are not wrapped into hours).
pub fn format_clock(total_secs: u64) -> String {
  format!("{}:{:02}", total_secs / 60, total_secs % 60)
}

/// Pick `"s"` when a count needs a plural noun.
pub fn plural(n: usize) -> &'static str {
  if n == 1 { "" } else { "s" }
}

/// Parse a 1-based, comma separated index list ("1,3, 5") into 0-based indices.
/// Ranges like "2-4" are accepted too. Every number must fall within `len` cards.
pub fn parse_index_list(s: &str, len: usize) -> Result<Vec<usize>, String> {
  let mut out = Vec::new();
  for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
    if let Some((a, b)) = part.split_once('-') {
      let a = parse_card_number(a.trim(), len)?;
      let b = parse_card_number(b.trim(), len)?;
      if b < a {
        return Err(format!("Invalid range '{}'", part));
      }
      out.extend(a..=b);
    } else {
      out.push(parse_card_number(part, len)?);
    }
  }
  Ok(out)
}

fn parse_card_number(s: &str, len: usize) -> Result<usize, String> {
  let n = parse_one_based(s)?;
  if n >= len {
    return Err(format!("There is no card {} (the deck has {})", n + 1, len));
  }
  Ok(n)
}

fn parse_one_based(s: &str) -> Result<usize, String> {
  match s.parse::<usize>() {
    Ok(0) | Err(_) => Err(format!("'{}' is not a card number (numbers start at 1)", s)),
    Ok(n) => Ok(n - 1),
  }
}

/// Log-safe truncation for large strings.
/// Avoids spamming logs with whole chat messages.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.chars().count() <= max {
    s.to_string()
  } else {
    let head: String = s.chars().take(max).collect();
    format!("{}… ({} bytes total)", head, s.len())
  }
}
