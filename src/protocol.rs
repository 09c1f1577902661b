//! Request/response DTOs for the REST backend and the identity service (serde ready).
//! Field names follow the backend's snake_case JSON.

use serde::{Deserialize, Serialize};

use crate::domain::{ConversationSettings, Flashcard, PracticeType, Role};

//
// Flashcard generation & decks
//

#[derive(Debug, Serialize)]
pub struct GenerateIn<'a> {
    pub text: &'a str,
    pub difficulty: &'a str,
    pub user_id: &'a str,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct GenerateOut {
    #[serde(default)]
    pub deck_id: Option<String>,
    pub flashcards: Vec<Flashcard>,
    #[serde(default)]
    pub count: usize,
    #[serde(default)]
    pub processing_time: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct CreateDeckIn<'a> {
    pub title: &'a str,
    pub flashcards: &'a [Flashcard],
    pub difficulty: &'a str,
    pub source_text: &'a str,
    pub user_id: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct CreateDeckOut {
    pub deck_id: String,
}

#[derive(Debug, Serialize)]
pub struct RenameDeckIn<'a> {
    pub title: &'a str,
}

/// Sort keys accepted by the deck listing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum DeckSort {
    #[default]
    #[value(name = "created_at")]
    CreatedAt,
    Title,
    #[value(name = "card_count")]
    CardCount,
}

impl DeckSort {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeckSort::CreatedAt => "created_at",
            DeckSort::Title => "title",
            DeckSort::CardCount => "card_count",
        }
    }
}

//
// Words
//

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct NewWord {
    pub word: String,
    pub definition: String,
    pub example: String,
    pub pronunciation: String,
    pub user_id: String,
}

#[derive(Debug, Serialize)]
pub struct BatchWordsIn<'a> {
    pub words: &'a [NewWord],
    pub user_id: &'a str,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct BatchWordsOut {
    #[serde(default)]
    pub saved: usize,
    #[serde(default)]
    pub skipped: usize,
    #[serde(default)]
    pub errors: Vec<serde_json::Value>,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct WordUpdate {
    pub word: String,
    pub definition: String,
    pub example: String,
    pub pronunciation: String,
}

//
// Conversation practice
//

#[derive(Debug, Serialize)]
pub struct ChatTurn<'a> {
    pub role: Role,
    pub content: &'a str,
}

#[derive(Debug, Serialize)]
pub struct ConversationIn<'a> {
    pub deck_id: &'a str,
    pub user_id: &'a str,
    pub messages: Vec<ChatTurn<'a>>,
    pub is_first_message: bool,
    pub settings: &'a ConversationSettings,
}

#[derive(Debug, Deserialize)]
pub struct ConversationOut {
    pub message: String,
    #[serde(default)]
    pub words_used: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct SessionRecordIn<'a> {
    pub user_id: &'a str,
    pub duration_seconds: u64,
    pub practice_type: PracticeType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deck_id: Option<&'a str>,
}

#[derive(Debug, Serialize)]
pub struct TranscribeIn<'a> {
    pub audio_base64: String,
    pub mime: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct TranscribeOut {
    #[serde(default)]
    pub text: String,
}

//
// Stats & user settings
//

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct DailyStats {
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub total_seconds: u64,
    #[serde(default)]
    pub sessions: u32,
    #[serde(default)]
    pub daily_goal_minutes: Option<u32>,
}

impl DailyStats {
    pub fn minutes(&self) -> u64 {
        self.total_seconds / 60
    }

    pub fn goal_met(&self) -> bool {
        self.daily_goal_minutes
            .map(|g| self.minutes() >= u64::from(g))
            .unwrap_or(false)
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct UserSettings {
    pub daily_goal_minutes: u32,
}

#[derive(Debug, Serialize)]
pub struct UserSettingsIn<'a> {
    pub user_id: &'a str,
    pub daily_goal_minutes: u32,
}

//
// Identity service
//

#[derive(Debug, Serialize)]
pub struct CredentialsIn<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Token grant / signup response. Signup without auto-confirm returns only the user
/// (sometimes at the top level), so every field is optional.
#[derive(Debug, Deserialize)]
pub struct AuthGrantOut {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub user: Option<AuthUser>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl AuthGrantOut {
    pub fn into_user(self) -> Option<AuthUser> {
        self.user
            .or_else(|| self.id.map(|id| AuthUser { id, email: self.email }))
    }
}
