//! Typed client for the flashcard REST backend.
//!
//! Every call is a plain request/response JSON exchange. Non-success statuses are turned
//! into `ApiError::Http` carrying the backend's `detail` message when it sent one.
//! Calls are instrumented and log sizes and ids, never message contents or tokens.

use std::time::Duration;

use base64::Engine;
use futures::future::BoxFuture;
use reqwest::header::{AUTHORIZATION, USER_AGENT};
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info, instrument};

use crate::config::AppConfig;
use crate::domain::{ConversationSettings, Deck, DeckSummary, Flashcard, Message, PracticeType, Word};
use crate::error::ApiError;
use crate::protocol::*;

const CLIENT_UA: &str = concat!("lingodeck/", env!("CARGO_PKG_VERSION"));

/// Join the configured base with an endpoint path, inserting the leading `/` if missing.
pub fn api_url(base: &str, path: &str) -> String {
  if path.starts_with('/') {
    format!("{}{}", base, path)
  } else {
    format!("{}/{}", base, path)
  }
}

#[derive(Clone)]
pub struct ApiClient {
  client: reqwest::Client,
  pub base_url: String,
  token: Option<String>,
}

impl ApiClient {
  pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
    let client = reqwest::Client::builder().timeout(timeout).build()?;
    Ok(Self { client, base_url: base_url.into(), token: None })
  }

  pub fn from_config(cfg: &AppConfig) -> Result<Self, ApiError> {
    Self::new(cfg.api_base_url.clone(), Duration::from_secs(cfg.request_timeout_secs))
  }

  /// Attach the signed-in user's access token to every request.
  pub fn with_token(mut self, token: Option<String>) -> Self {
    self.token = token;
    self
  }

  pub fn url(&self, path: &str) -> String {
    api_url(&self.base_url, path)
  }

  fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
    let mut rb = self.client.request(method, self.url(path)).header(USER_AGENT, CLIENT_UA);
    if let Some(t) = &self.token {
      rb = rb.header(AUTHORIZATION, format!("Bearer {}", t));
    }
    rb
  }

  async fn send_json<T: DeserializeOwned>(&self, rb: RequestBuilder) -> Result<T, ApiError> {
    let res = check(rb.send().await?).await?;
    Ok(res.json::<T>().await?)
  }

  async fn send_empty(&self, rb: RequestBuilder) -> Result<(), ApiError> {
    check(rb.send().await?).await?;
    Ok(())
  }

  // --- Flashcards & decks ---

  #[instrument(level = "info", skip(self, text), fields(text_len = text.len(), %difficulty))]
  pub async fn generate_flashcards(&self, user_id: &str, text: &str, difficulty: &str) -> Result<GenerateOut, ApiError> {
    let start = std::time::Instant::now();
    let body = GenerateIn { text, difficulty, user_id };
    let out: GenerateOut = self.send_json(self.request(reqwest::Method::POST, "/api/generate-flashcards").json(&body)).await?;
    info!(target: "lingodeck", elapsed = ?start.elapsed(), count = out.flashcards.len(), "Flashcards generated");
    Ok(out)
  }

  #[instrument(level = "info", skip(self, flashcards, source_text), fields(cards = flashcards.len()))]
  pub async fn create_deck(
    &self,
    user_id: &str,
    title: &str,
    flashcards: &[Flashcard],
    difficulty: &str,
    source_text: &str,
  ) -> Result<String, ApiError> {
    let body = CreateDeckIn { title, flashcards, difficulty, source_text, user_id };
    let out: CreateDeckOut = self.send_json(self.request(reqwest::Method::POST, "/api/decks").json(&body)).await?;
    Ok(out.deck_id)
  }

  #[instrument(level = "info", skip(self))]
  pub async fn list_decks(&self, user_id: &str, sort: DeckSort, search: Option<&str>) -> Result<Vec<DeckSummary>, ApiError> {
    let mut q = vec![("user_id", user_id), ("sort_by", sort.as_str())];
    if let Some(s) = search.filter(|s| !s.is_empty()) {
      q.push(("search", s));
    }
    self.send_json(self.request(reqwest::Method::GET, "/api/my-decks").query(&q)).await
  }

  #[instrument(level = "info", skip(self))]
  pub async fn get_deck(&self, deck_id: &str) -> Result<Deck, ApiError> {
    let mut deck: Deck = self.send_json(self.request(reqwest::Method::GET, &format!("/api/decks/{}", deck_id))).await?;
    if deck.count == 0 {
      deck.count = deck.flashcards.len();
    }
    Ok(deck)
  }

  #[instrument(level = "info", skip(self))]
  pub async fn rename_deck(&self, user_id: &str, deck_id: &str, title: &str) -> Result<(), ApiError> {
    let rb = self
      .request(reqwest::Method::PUT, &format!("/api/decks/{}", deck_id))
      .query(&[("user_id", user_id)])
      .json(&RenameDeckIn { title });
    self.send_empty(rb).await
  }

  #[instrument(level = "info", skip(self))]
  pub async fn delete_deck(&self, user_id: &str, deck_id: &str) -> Result<(), ApiError> {
    let rb = self
      .request(reqwest::Method::DELETE, &format!("/api/decks/{}", deck_id))
      .query(&[("user_id", user_id)]);
    self.send_empty(rb).await
  }

  // --- Words ---

  #[instrument(level = "info", skip(self))]
  pub async fn list_words(&self, user_id: &str, page: u32, page_size: u32, search: Option<&str>) -> Result<Vec<Word>, ApiError> {
    let page = page.to_string();
    let page_size = page_size.to_string();
    let mut q = vec![("user_id", user_id), ("page", page.as_str()), ("page_size", page_size.as_str())];
    if let Some(s) = search.filter(|s| !s.is_empty()) {
      q.push(("search", s));
    }
    self.send_json(self.request(reqwest::Method::GET, "/api/my-words").query(&q)).await
  }

  #[instrument(level = "info", skip(self, word), fields(word = %word.word))]
  pub async fn create_word(&self, word: &NewWord) -> Result<(), ApiError> {
    self.send_empty(self.request(reqwest::Method::POST, "/api/words").json(word)).await
  }

  #[instrument(level = "info", skip(self, words), fields(words = words.len()))]
  pub async fn save_words_batch(&self, user_id: &str, words: &[NewWord]) -> Result<BatchWordsOut, ApiError> {
    let out: BatchWordsOut = self
      .send_json(self.request(reqwest::Method::POST, "/api/words/batch").json(&BatchWordsIn { words, user_id }))
      .await?;
    info!(target: "lingodeck", saved = out.saved, skipped = out.skipped, errors = out.errors.len(), "Batch word save");
    Ok(out)
  }

  #[instrument(level = "info", skip(self, update))]
  pub async fn update_word(&self, user_id: &str, word_id: &str, update: &WordUpdate) -> Result<(), ApiError> {
    let rb = self
      .request(reqwest::Method::PUT, &format!("/api/words/{}", word_id))
      .query(&[("user_id", user_id)])
      .json(update);
    self.send_empty(rb).await
  }

  #[instrument(level = "info", skip(self))]
  pub async fn delete_word(&self, user_id: &str, word_id: &str) -> Result<(), ApiError> {
    let rb = self
      .request(reqwest::Method::DELETE, &format!("/api/words/{}", word_id))
      .query(&[("user_id", user_id)]);
    self.send_empty(rb).await
  }

  // --- Practice ---

  /// One conversation turn: the full history goes up, one assistant reply comes back.
  #[instrument(level = "info", skip(self, history, settings), fields(messages = history.len()))]
  pub async fn conversation_turn(
    &self,
    user_id: &str,
    deck_id: &str,
    history: &[Message],
    is_first_message: bool,
    settings: &ConversationSettings,
  ) -> Result<ConversationOut, ApiError> {
    if history.is_empty() {
      return Err(ApiError::Invalid("Cannot send empty message array".into()));
    }
    let messages = history.iter().map(|m| ChatTurn { role: m.role, content: &m.content }).collect();
    let body = ConversationIn { deck_id, user_id, messages, is_first_message, settings };
    let start = std::time::Instant::now();
    let out: ConversationOut = self
      .send_json(self.request(reqwest::Method::POST, "/api/practice/conversation").json(&body))
      .await?;
    debug!(
      target: "practice",
      elapsed = ?start.elapsed(),
      reply_len = out.message.len(),
      words_used = out.words_used.as_ref().map(|w| w.len()).unwrap_or(0),
      "Assistant reply received"
    );
    Ok(out)
  }

  #[instrument(level = "info", skip(self))]
  pub async fn record_session(
    &self,
    user_id: &str,
    duration_seconds: u64,
    practice_type: PracticeType,
    deck_id: Option<&str>,
  ) -> Result<(), ApiError> {
    let body = SessionRecordIn { user_id, duration_seconds, practice_type, deck_id };
    self.send_empty(self.request(reqwest::Method::POST, "/api/practice/sessions").json(&body)).await
  }

  #[instrument(level = "info", skip(self, audio), fields(audio_len = audio.len(), %mime))]
  pub async fn transcribe(&self, audio: &[u8], mime: &str) -> Result<String, ApiError> {
    let body = TranscribeIn { audio_base64: base64::engine::general_purpose::STANDARD.encode(audio), mime };
    let out: TranscribeOut = self
      .send_json(self.request(reqwest::Method::POST, "/api/practice/transcribe").json(&body))
      .await?;
    Ok(out.text.trim().to_string())
  }

  // --- Stats & settings ---

  #[instrument(level = "info", skip(self))]
  pub async fn daily_stats(&self, user_id: &str) -> Result<DailyStats, ApiError> {
    self.send_json(self.request(reqwest::Method::GET, "/api/stats/daily").query(&[("user_id", user_id)])).await
  }

  #[instrument(level = "info", skip(self))]
  pub async fn get_user_settings(&self, user_id: &str) -> Result<UserSettings, ApiError> {
    self.send_json(self.request(reqwest::Method::GET, "/api/settings").query(&[("user_id", user_id)])).await
  }

  #[instrument(level = "info", skip(self))]
  pub async fn set_daily_goal(&self, user_id: &str, daily_goal_minutes: u32) -> Result<(), ApiError> {
    if daily_goal_minutes == 0 {
      return Err(ApiError::Invalid("Daily goal must be at least 1 minute".into()));
    }
    let body = UserSettingsIn { user_id, daily_goal_minutes };
    self.send_empty(self.request(reqwest::Method::PUT, "/api/settings").json(&body)).await
  }
}

/// Upload-based transcription used by the speech adapter's recording fallback.
pub trait Transcriber: Send + Sync {
  fn transcribe<'a>(&'a self, audio: Vec<u8>, mime: &'a str) -> BoxFuture<'a, Result<String, ApiError>>;
}

impl Transcriber for ApiClient {
  fn transcribe<'a>(&'a self, audio: Vec<u8>, mime: &'a str) -> BoxFuture<'a, Result<String, ApiError>> {
    Box::pin(async move { ApiClient::transcribe(self, &audio, mime).await })
  }
}

/// Pass successful responses through; otherwise build an error from the body.
async fn check(res: Response) -> Result<Response, ApiError> {
  let status = res.status();
  if status.is_success() {
    return Ok(res);
  }
  let body = res.text().await.unwrap_or_default();
  let message = extract_error_detail(&body).unwrap_or_else(|| format!("Error: {}", status.as_u16()));
  Err(ApiError::Http { status: status.as_u16(), message })
}

/// Try to extract a clean, human-readable message from a JSON error body.
///
/// Understands the backend's `{"detail": "..."}`, its validation form
/// `{"detail": [{"msg": "..."}]}`, and the identity service's `error_description` / `msg`.
pub fn extract_error_detail(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap {
    #[serde(default)] detail: Option<serde_json::Value>,
    #[serde(default)] error_description: Option<String>,
    #[serde(default)] msg: Option<String>,
    #[serde(default)] message: Option<String>,
  }
  let w: EWrap = serde_json::from_str(body).ok()?;
  let from_detail = match w.detail {
    Some(serde_json::Value::String(s)) => Some(s),
    Some(serde_json::Value::Array(items)) => items
      .first()
      .and_then(|i| i.get("msg"))
      .and_then(|m| m.as_str())
      .map(str::to_string),
    _ => None,
  };
  from_detail
    .or(w.error_description)
    .or(w.msg)
    .or(w.message)
    .filter(|s| !s.trim().is_empty())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testutil::spawn_backend;
  use axum::{
    extract::{Path, Query},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
  };
  use std::collections::HashMap;

  #[test]
  fn url_inserts_missing_slash() {
    assert_eq!(api_url("http://localhost:8000", "/api/decks"), "http://localhost:8000/api/decks");
    assert_eq!(api_url("http://localhost:8000", "api/decks"), "http://localhost:8000/api/decks");
  }

  #[test]
  fn error_detail_forms() {
    assert_eq!(extract_error_detail(r#"{"detail":"Deck not found"}"#).as_deref(), Some("Deck not found"));
    assert_eq!(
      extract_error_detail(r#"{"detail":[{"loc":["body","text"],"msg":"field required"}]}"#).as_deref(),
      Some("field required")
    );
    assert_eq!(
      extract_error_detail(r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#).as_deref(),
      Some("Invalid login credentials")
    );
    assert_eq!(extract_error_detail("<html>oops</html>"), None);
    assert_eq!(extract_error_detail(r#"{"detail":""}"#), None);
  }

  #[tokio::test]
  async fn http_error_uses_detail_or_status() {
    let app = Router::new()
      .route(
        "/api/decks/:id",
        get(|Path(id): Path<String>| async move {
          if id == "plain" {
            (StatusCode::BAD_GATEWAY, "upstream down".to_string())
          } else {
            (StatusCode::NOT_FOUND, r#"{"detail":"Deck not found"}"#.to_string())
          }
        }),
      );
    let base = spawn_backend(app).await;
    let api = ApiClient::new(base, Duration::from_secs(5)).unwrap();

    match api.get_deck("missing").await {
      Err(ApiError::Http { status, message }) => {
        assert_eq!(status, 404);
        assert_eq!(message, "Deck not found");
      }
      other => panic!("unexpected: {:?}", other.map(|d| d.id)),
    }
    let err = api.get_deck("plain").await.unwrap_err();
    assert_eq!(err.to_string(), "Error: 502");
  }

  #[tokio::test]
  async fn deck_listing_sends_query_parameters() {
    let app = Router::new().route(
      "/api/my-decks",
      get(|Query(q): Query<HashMap<String, String>>| async move {
        assert_eq!(q.get("user_id").map(String::as_str), Some("u1"));
        assert_eq!(q.get("sort_by").map(String::as_str), Some("title"));
        let search = q.get("search").cloned().unwrap_or_default();
        Json(serde_json::json!([
          {"id": "d1", "title": format!("found:{}", search), "card_count": 3, "difficulty": "easy",
           "created_at": "2025-01-02T03:04:05Z"}
        ]))
      }),
    );
    let base = spawn_backend(app).await;
    let api = ApiClient::new(base, Duration::from_secs(5)).unwrap();

    let decks = api.list_decks("u1", DeckSort::Title, Some("fr")).await.unwrap();
    assert_eq!(decks.len(), 1);
    assert_eq!(decks[0].title, "found:fr");
    assert_eq!(decks[0].card_count, 3);
    assert!(decks[0].created_at.is_some());
  }

  #[tokio::test]
  async fn batch_save_and_delete_round() {
    let app = Router::new()
      .route(
        "/api/words/batch",
        post(|Json(v): Json<serde_json::Value>| async move {
          let n = v["words"].as_array().map(|a| a.len()).unwrap_or(0);
          Json(serde_json::json!({"saved": n - 1, "skipped": 1, "errors": []}))
        }),
      )
      .route(
        "/api/words/:id",
        delete(|Path(id): Path<String>, Query(q): Query<HashMap<String, String>>| async move {
          if id == "w1" && q.get("user_id").map(String::as_str) == Some("u1") {
            StatusCode::NO_CONTENT
          } else {
            StatusCode::FORBIDDEN
          }
        }),
      );
    let base = spawn_backend(app).await;
    let api = ApiClient::new(base, Duration::from_secs(5)).unwrap();

    let words: Vec<NewWord> = ["chien", "chat"]
      .iter()
      .map(|w| NewWord {
        word: w.to_string(),
        definition: "x".into(),
        example: String::new(),
        pronunciation: String::new(),
        user_id: "u1".into(),
      })
      .collect();
    let out = api.save_words_batch("u1", &words).await.unwrap();
    assert_eq!((out.saved, out.skipped), (1, 1));

    api.delete_word("u1", "w1").await.unwrap();
    assert!(api.delete_word("u2", "w1").await.is_err());
  }

  #[tokio::test]
  async fn empty_history_is_rejected_before_sending() {
    let api = ApiClient::new("http://127.0.0.1:9", Duration::from_secs(1)).unwrap();
    let err = api
      .conversation_turn("u1", "d1", &[], true, &ConversationSettings::default())
      .await
      .unwrap_err();
    assert!(matches!(err, ApiError::Invalid(_)));
  }

  #[tokio::test]
  async fn zero_daily_goal_is_rejected() {
    let api = ApiClient::new("http://127.0.0.1:9", Duration::from_secs(1)).unwrap();
    assert!(matches!(api.set_daily_goal("u1", 0).await, Err(ApiError::Invalid(_))));
  }
}
