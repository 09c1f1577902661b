//! Client-side behaviours shared by the library commands and the practice REPL.
//!
//! This includes:
//!   - Card selection over a preview (always a subset of the deck's indices)
//!   - Immersion level labels and descriptions
//!   - Turning selected cards into words and reporting batch-save results
//!   - The flip-card study cursor
//!   - Generate-input validation

use std::collections::BTreeSet;

use rand::seq::SliceRandom;

use crate::domain::{Flashcard, MAX_IMMERSION};
use crate::protocol::{BatchWordsOut, NewWord};
use crate::util::plural;

pub const MAX_SOURCE_TEXT_CHARS: usize = 10_000;

/// Selected card indices of a preview. Starts fully selected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Selection {
  len: usize,
  picked: BTreeSet<usize>,
}

impl Selection {
  pub fn all(len: usize) -> Self {
    Self { len, picked: (0..len).collect() }
  }

  /// Out-of-range indices are ignored.
  pub fn toggle(&mut self, index: usize) {
    if index >= self.len {
      return;
    }
    if !self.picked.remove(&index) {
      self.picked.insert(index);
    }
  }

  /// Clear a full selection, otherwise select everything.
  pub fn toggle_all(&mut self) {
    if self.is_all() {
      self.picked.clear();
    } else {
      self.picked = (0..self.len).collect();
    }
  }

  /// Replace the selection with `indices`, dropping any out of range.
  pub fn only(&mut self, indices: &[usize]) {
    self.picked = indices.iter().copied().filter(|i| *i < self.len).collect();
  }

  pub fn is_all(&self) -> bool {
    self.picked.len() == self.len
  }

  pub fn is_selected(&self, index: usize) -> bool {
    self.picked.contains(&index)
  }

  pub fn count(&self) -> usize {
    self.picked.len()
  }

  /// Selected cards, in deck order.
  pub fn pick<'a>(&self, cards: &'a [Flashcard]) -> Vec<&'a Flashcard> {
    self.picked.iter().filter_map(|i| cards.get(*i)).collect()
  }
}

pub fn clamp_immersion(level: i64) -> u8 {
  level.clamp(0, MAX_IMMERSION as i64) as u8
}

pub fn immersion_label(level: u8) -> &'static str {
  match level {
    0..=33 => "Minimal",
    34..=66 => "Partial",
    _ => "Complete",
  }
}

pub fn immersion_description(level: u8) -> &'static str {
  match level {
    0..=33 => "AI uses mostly English with occasional target language words. Provides translations immediately.",
    34..=66 => "Mix of English and target language (50/50). AI uses target language for vocab words and common phrases.",
    _ => "AI responds entirely in target language. Natural native-level conversation.",
  }
}

/// Selected cards as new words: front becomes the word, back the definition.
pub fn words_to_save(cards: &[&Flashcard], user_id: &str) -> Vec<NewWord> {
  cards
    .iter()
    .map(|c| NewWord {
      word: c.front.clone(),
      definition: c.back.clone(),
      example: String::new(),
      pronunciation: String::new(),
      user_id: user_id.to_string(),
    })
    .collect()
}

/// One notice per non-zero count of a batch save. The bool marks an error notice.
pub fn batch_summary_lines(out: &BatchWordsOut) -> Vec<(bool, String)> {
  let mut lines = Vec::new();
  if out.saved > 0 {
    lines.push((false, format!("Successfully saved {} word{}", out.saved, plural(out.saved))));
  }
  if out.skipped > 0 {
    let verb = if out.skipped == 1 { "exists" } else { "exist" };
    lines.push((true, format!("{} word{} already {}", out.skipped, plural(out.skipped), verb)));
  }
  if !out.errors.is_empty() {
    lines.push((true, format!("Some errors occurred: {}", out.errors.len())));
  }
  lines
}

/// Generation input must be 1..=10000 characters after trimming.
pub fn validate_source_text(text: &str) -> Result<&str, String> {
  let t = text.trim();
  if t.is_empty() {
    return Err("Please enter some text to generate flashcards from".into());
  }
  let n = t.chars().count();
  if n > MAX_SOURCE_TEXT_CHARS {
    return Err(format!("Text is too long ({} characters, at most {})", n, MAX_SOURCE_TEXT_CHARS));
  }
  Ok(t)
}

/// Position in a flip-card study run. Moving wraps around and shows the front again.
#[derive(Debug)]
pub struct StudyCursor {
  order: Vec<usize>,
  pos: usize,
  flipped: bool,
}

impl StudyCursor {
  pub fn new(len: usize) -> Self {
    Self { order: (0..len).collect(), pos: 0, flipped: false }
  }

  pub fn shuffled(len: usize) -> Self {
    let mut c = Self::new(len);
    c.order.shuffle(&mut rand::thread_rng());
    c
  }

  pub fn len(&self) -> usize {
    self.order.len()
  }

  /// 0-based position within the run.
  pub fn position(&self) -> usize {
    self.pos
  }

  /// Index of the current card in the deck.
  pub fn current(&self) -> Option<usize> {
    self.order.get(self.pos).copied()
  }

  pub fn is_flipped(&self) -> bool {
    self.flipped
  }

  pub fn flip(&mut self) {
    self.flipped = !self.flipped;
  }

  pub fn next(&mut self) {
    if !self.order.is_empty() {
      self.pos = (self.pos + 1) % self.order.len();
    }
    self.flipped = false;
  }

  pub fn prev(&mut self) {
    if !self.order.is_empty() {
      self.pos = (self.pos + self.order.len() - 1) % self.order.len();
    }
    self.flipped = false;
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn cards(n: usize) -> Vec<Flashcard> {
    (0..n).map(|i| Flashcard { front: format!("f{i}"), back: format!("b{i}") }).collect()
  }

  #[test]
  fn selection_stays_within_deck() {
    let mut s = Selection::all(3);
    assert!(s.is_all());
    s.toggle(7);
    assert_eq!(s.count(), 3);
    s.toggle(1);
    assert!(!s.is_selected(1));
    assert!(!s.is_all());

    s.toggle_all();
    assert!(s.is_all());
    s.toggle_all();
    assert_eq!(s.count(), 0);

    s.only(&[2, 0, 9]);
    let deck = cards(3);
    let fronts: Vec<&str> = s.pick(&deck).iter().map(|c| c.front.as_str()).collect();
    assert_eq!(fronts, vec!["f0", "f2"]);
  }

  #[test]
  fn immersion_bands() {
    assert_eq!(immersion_label(0), "Minimal");
    assert_eq!(immersion_label(33), "Minimal");
    assert_eq!(immersion_label(34), "Partial");
    assert_eq!(immersion_label(66), "Partial");
    assert_eq!(immersion_label(67), "Complete");
    assert!(immersion_description(50).starts_with("Mix of English"));
    assert_eq!(clamp_immersion(-5), 0);
    assert_eq!(clamp_immersion(250), 100);
  }

  #[test]
  fn batch_messages_are_pluralised() {
    let out = BatchWordsOut { saved: 1, skipped: 2, errors: vec![serde_json::json!({"word": "x"})] };
    assert_eq!(
      batch_summary_lines(&out),
      vec![
        (false, "Successfully saved 1 word".to_string()),
        (true, "2 words already exist".to_string()),
        (true, "Some errors occurred: 1".to_string()),
      ]
    );
    let out = BatchWordsOut { saved: 3, skipped: 1, errors: vec![] };
    assert_eq!(
      batch_summary_lines(&out),
      vec![(false, "Successfully saved 3 words".to_string()), (true, "1 word already exists".to_string())]
    );
    assert!(batch_summary_lines(&BatchWordsOut::default()).is_empty());
  }

  #[test]
  fn words_from_cards() {
    let deck = cards(2);
    let picked: Vec<&Flashcard> = deck.iter().collect();
    let words = words_to_save(&picked, "u1");
    assert_eq!(words[1].word, "f1");
    assert_eq!(words[1].definition, "b1");
    assert_eq!(words[1].user_id, "u1");
    assert!(words[0].example.is_empty());
  }

  #[test]
  fn source_text_limits() {
    assert!(validate_source_text("   ").is_err());
    assert_eq!(validate_source_text("  salut ").unwrap(), "salut");
    assert!(validate_source_text(&"é".repeat(MAX_SOURCE_TEXT_CHARS)).is_ok());
    assert!(validate_source_text(&"a".repeat(MAX_SOURCE_TEXT_CHARS + 1)).is_err());
  }

  #[test]
  fn study_cursor_wraps_and_unflips() {
    let mut c = StudyCursor::new(3);
    c.flip();
    assert!(c.is_flipped());
    c.prev();
    assert_eq!(c.current(), Some(2));
    assert!(!c.is_flipped());
    c.next();
    c.next();
    assert_eq!(c.current(), Some(1));

    let mut empty = StudyCursor::new(0);
    empty.next();
    empty.prev();
    assert_eq!(empty.current(), None);
  }

  #[test]
  fn shuffled_cursor_is_a_permutation() {
    let mut c = StudyCursor::shuffled(10);
    let mut seen: Vec<usize> = (0..c.len()).map(|_| {
      let i = c.current().unwrap();
      c.next();
      i
    }).collect();
    seen.sort();
    assert_eq!(seen, (0..10).collect::<Vec<_>>());
  }
}
