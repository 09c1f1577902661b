//! Inline vocabulary markup in assistant replies.
//!
//! The assistant wraps words in `<vocab>…</vocab>` (a word from the active deck) or
//! `<unknown>…</unknown>` (a word the learner probably does not know yet). A reply is
//! split into plain-text runs and decorated words, in original order, with the text
//! outside the markers kept verbatim. Each decorated word carries a definition: the
//! back of the deck card whose front matches case-insensitively, or the word itself.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::domain::{find_card, Flashcard};

static VOCAB_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<vocab>(.*?)</vocab>").expect("vocab marker regex"));
static UNKNOWN_RE: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"(?i)<unknown>(.*?)</unknown>").expect("unknown marker regex"));

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkerKind {
  Vocab,
  Unknown,
}

/// One well-formed marker occurrence, with byte offsets of the whole marker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MarkerMatch {
  pub kind: MarkerKind,
  pub start: usize,
  pub end: usize,
  pub word: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DecoratedWord {
  pub word: String,
  pub definition: String,
  pub kind: MarkerKind,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Segment {
  Text { text: String },
  Word(DecoratedWord),
}

impl Segment {
  pub fn text(s: impl Into<String>) -> Self {
    Segment::Text { text: s.into() }
  }
}

/// All markers of both kinds, ordered by start offset (stable for ties).
pub fn find_markers(text: &str) -> Vec<MarkerMatch> {
  let mut found: Vec<MarkerMatch> = Vec::new();
  for (re, kind) in [(&*VOCAB_RE, MarkerKind::Vocab), (&*UNKNOWN_RE, MarkerKind::Unknown)] {
    for caps in re.captures_iter(text) {
      let (Some(whole), Some(word)) = (caps.get(0), caps.get(1)) else { continue };
      found.push(MarkerMatch { kind, start: whole.start(), end: whole.end(), word: word.as_str().to_string() });
    }
  }
  found.sort_by_key(|m| m.start);
  found
}

/// Split an assistant message into plain and decorated segments.
pub fn parse_message_with_tags(text: &str, flashcards: &[Flashcard]) -> Vec<Segment> {
  let matches = find_markers(text);
  if matches.is_empty() {
    return vec![Segment::text(text)];
  }

  let mut out = Vec::with_capacity(matches.len() * 2 + 1);
  let mut last = 0usize;
  for m in matches {
    // Starts inside an already emitted marker: its text is covered there.
    if m.start < last {
      continue;
    }
    if m.start > last {
      out.push(Segment::text(&text[last..m.start]));
    }
    let definition = find_card(flashcards, &m.word)
      .map(|c| c.back.clone())
      .unwrap_or_else(|| m.word.clone());
    out.push(Segment::Word(DecoratedWord { word: m.word, definition, kind: m.kind }));
    last = m.end;
  }
  if last < text.len() {
    out.push(Segment::text(&text[last..]));
  }
  out
}

/// Message text with the markup removed (what the learner actually reads).
pub fn plain_text(segments: &[Segment]) -> String {
  segments
    .iter()
    .map(|s| match s {
      Segment::Text { text } => text.as_str(),
      Segment::Word(w) => w.word.as_str(),
    })
    .collect()
}

/// Terminal rendering: decorated words in brackets (`[word]` for deck words, `{word}`
/// for unknown ones), followed by one gloss line per distinct word.
pub fn render_for_terminal(segments: &[Segment]) -> String {
  let mut body = String::new();
  let mut glosses: Vec<&DecoratedWord> = Vec::new();
  for s in segments {
    match s {
      Segment::Text { text } => body.push_str(text),
      Segment::Word(w) => {
        let (open, close) = match w.kind {
          MarkerKind::Vocab => ('[', ']'),
          MarkerKind::Unknown => ('{', '}'),
        };
        body.push(open);
        body.push_str(&w.word);
        body.push(close);
        if !w.word.is_empty() && !glosses.iter().any(|g| g.word.eq_ignore_ascii_case(&w.word)) {
          glosses.push(w);
        }
      }
    }
  }
  for g in glosses {
    body.push_str(&format!("\n    {}: {}", g.word, g.definition));
  }
  body
}

#[cfg(test)]
mod tests {
  use super::*;

  fn card(front: &str, back: &str) -> Flashcard {
    Flashcard { front: front.into(), back: back.into() }
  }

  fn word(w: &str, def: &str, kind: MarkerKind) -> Segment {
    Segment::Word(DecoratedWord { word: w.into(), definition: def.into(), kind })
  }

  #[test]
  fn no_markers_is_identity() {
    for input in ["", "plain text", "a < b > c", "<vocab>unclosed", "</vocab>backwards<vocab>"] {
      assert_eq!(parse_message_with_tags(input, &[]), vec![Segment::text(input)], "input: {input:?}");
    }
  }

  #[test]
  fn known_word_gets_card_definition() {
    let deck = [card("bonjour", "hello")];
    let out = parse_message_with_tags("<vocab>bonjour</vocab> le monde", &deck);
    assert_eq!(out, vec![word("bonjour", "hello", MarkerKind::Vocab), Segment::text(" le monde")]);
  }

  #[test]
  fn lookup_and_tags_are_case_insensitive() {
    let deck = [card("Chien", "dog")];
    let out = parse_message_with_tags("Un <VOCAB>chien</Vocab>!", &deck);
    assert_eq!(out, vec![Segment::text("Un "), word("chien", "dog", MarkerKind::Vocab), Segment::text("!")]);
  }

  #[test]
  fn missing_card_falls_back_to_word() {
    let out = parse_message_with_tags("<unknown>ordinateur</unknown>", &[card("chat", "cat")]);
    assert_eq!(out, vec![word("ordinateur", "ordinateur", MarkerKind::Unknown)]);
  }

  #[test]
  fn matches_come_out_in_text_order() {
    // Unknown markers are scanned second but appear first here.
    let text = "<unknown>a</unknown> x <vocab>b</vocab> y <unknown>c</unknown>";
    let kinds: Vec<(MarkerKind, String)> = find_markers(text).into_iter().map(|m| (m.kind, m.word)).collect();
    assert_eq!(
      kinds,
      vec![
        (MarkerKind::Unknown, "a".to_string()),
        (MarkerKind::Vocab, "b".to_string()),
        (MarkerKind::Unknown, "c".to_string()),
      ]
    );
    let starts: Vec<usize> = find_markers(text).iter().map(|m| m.start).collect();
    assert!(starts.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(plain_text(&parse_message_with_tags(text, &[])), "a x b y c");
  }

  #[test]
  fn content_is_non_greedy() {
    let out = parse_message_with_tags("<vocab>un</vocab> et <vocab>deux</vocab>", &[]);
    assert_eq!(
      out,
      vec![word("un", "un", MarkerKind::Vocab), Segment::text(" et "), word("deux", "deux", MarkerKind::Vocab)]
    );
  }

  #[test]
  fn empty_marker_yields_empty_word() {
    let out = parse_message_with_tags("a<vocab></vocab>b", &[]);
    assert_eq!(out, vec![Segment::text("a"), word("", "", MarkerKind::Vocab), Segment::text("b")]);
  }

  #[test]
  fn nested_marker_is_covered_by_outer() {
    let out = parse_message_with_tags("<vocab><unknown>x</unknown></vocab> end", &[]);
    assert_eq!(out.len(), 2);
    assert_eq!(out[1], Segment::text(" end"));
    match &out[0] {
      Segment::Word(w) => {
        assert_eq!(w.kind, MarkerKind::Vocab);
        assert_eq!(w.word, "<unknown>x</unknown>");
      }
      other => panic!("expected word, got {other:?}"),
    }
  }

  #[test]
  fn markers_do_not_span_lines() {
    let input = "<vocab>two\nlines</vocab>";
    assert_eq!(parse_message_with_tags(input, &[]), vec![Segment::text(input)]);
  }

  #[test]
  fn terminal_rendering_lists_each_gloss_once() {
    let deck = [card("chat", "cat")];
    let segs = parse_message_with_tags("<vocab>chat</vocab> et <vocab>Chat</vocab> <unknown>noir</unknown>", &deck);
    let out = render_for_terminal(&segs);
    assert!(out.starts_with("[chat] et [Chat] {noir}"));
    assert_eq!(out.matches(": cat").count(), 1);
    assert!(out.contains("noir: noir"));
  }
}
