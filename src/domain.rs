//! Domain models exchanged with the backend: flashcards, decks, words, chat messages,
//! and the conversation practice settings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Flashcard {
  pub front: String,
  pub back: String,
}

/// Generation difficulty accepted by the backend.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
  Easy,
  #[default]
  Medium,
  Hard,
}

impl Difficulty {
  pub fn as_str(&self) -> &'static str {
    match self {
      Difficulty::Easy => "easy",
      Difficulty::Medium => "medium",
      Difficulty::Hard => "hard",
    }
  }
}

/// Full deck with its cards (`GET /api/decks/{id}`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Deck {
  #[serde(alias = "deck_id")]
  pub id: String,
  #[serde(default)]
  pub title: String,
  #[serde(default)]
  pub flashcards: Vec<Flashcard>,
  #[serde(default)]
  pub count: usize,
  #[serde(default)]
  pub difficulty: String,
}

impl Deck {
  /// Case-insensitive exact lookup of a card by its front.
  pub fn find_card(&self, front: &str) -> Option<&Flashcard> {
    find_card(&self.flashcards, front)
  }
}

pub fn find_card<'a>(cards: &'a [Flashcard], front: &str) -> Option<&'a Flashcard> {
  let needle = front.to_lowercase();
  cards.iter().find(|c| c.front.to_lowercase() == needle)
}

/// Row of the deck listing (`GET /api/my-decks`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeckSummary {
  #[serde(alias = "deck_id")]
  pub id: String,
  #[serde(default)]
  pub title: String,
  #[serde(default)]
  pub card_count: usize,
  #[serde(default)]
  pub difficulty: String,
  #[serde(default)]
  pub created_at: Option<DateTime<Utc>>,
}

/// Review status of a saved word.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WordStatus {
  Pending,
  Approved,
  Rejected,
  #[serde(untagged)]
  Other(String),
}

impl std::fmt::Display for WordStatus {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      WordStatus::Pending => f.write_str("pending"),
      WordStatus::Approved => f.write_str("approved"),
      WordStatus::Rejected => f.write_str("rejected"),
      WordStatus::Other(s) => f.write_str(s),
    }
  }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Word {
  pub id: String,
  pub word: String,
  pub definition: String,
  #[serde(default)]
  pub example: Option<String>,
  #[serde(default)]
  pub pronunciation: Option<String>,
  pub status: WordStatus,
  pub created_at: DateTime<Utc>,
  #[serde(default)]
  pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
  User,
  Assistant,
}

/// One chat turn of a practice session. Lives only in memory.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
  pub role: Role,
  pub content: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub words_used: Option<Vec<String>>,
  pub timestamp: DateTime<Utc>,
}

impl Message {
  pub fn user(content: impl Into<String>) -> Self {
    Self { role: Role::User, content: content.into(), words_used: None, timestamp: Utc::now() }
  }

  pub fn assistant(content: impl Into<String>, words_used: Vec<String>) -> Self {
    Self { role: Role::Assistant, content: content.into(), words_used: Some(words_used), timestamp: Utc::now() }
  }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum FocusMode {
  /// Steer the conversation towards the deck's words.
  #[default]
  DeckFocused,
  /// Let the conversation flow and use deck words when they fit.
  Natural,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SessionLength {
  Quick,
  #[default]
  Standard,
  Extended,
  Unlimited,
}

impl SessionLength {
  /// Planned length in minutes; `None` for unlimited sessions.
  pub fn minutes(&self) -> Option<u64> {
    match self {
      SessionLength::Quick => Some(5),
      SessionLength::Standard => Some(15),
      SessionLength::Extended => Some(30),
      SessionLength::Unlimited => None,
    }
  }
}

pub const MAX_IMMERSION: u8 = 100;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSettings {
  pub immersion_level: u8,
  pub focus_mode: FocusMode,
  pub topic: String,
  pub session_length: SessionLength,
  pub save_for_future: bool,
}

impl Default for ConversationSettings {
  fn default() -> Self {
    Self {
      immersion_level: 50,
      focus_mode: FocusMode::DeckFocused,
      topic: "general".into(),
      session_length: SessionLength::Standard,
      save_for_future: false,
    }
  }
}

/// Where a recorded practice session came from.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PracticeType {
  Conversation,
  Flashcards,
}
