//! One conversation-practice session against a deck.
//!
//! Holds the in-memory chat history, the set of deck words the assistant has used so
//! far, and the session timer. The timer's final duration is forwarded to the backend
//! by a recorder task, which lives exactly as long as the timer.

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::api::ApiClient;
use crate::config::PracticeConfig;
use crate::domain::{ConversationSettings, Deck, Message, PracticeType};
use crate::error::ApiError;
use crate::timer::{FinishedSession, SessionTimer};
use crate::util::fill_template;

/// End-of-session recap.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct SessionSummary {
  pub duration_seconds: u64,
  pub words_used: usize,
  pub total_words: usize,
  pub messages: usize,
  pub words_not_used: Vec<String>,
}

/// Forward each finished session duration to the backend. Ends when the timer is gone.
pub fn spawn_session_recorder(
  api: ApiClient,
  user_id: String,
  deck_id: String,
  mut rx: mpsc::UnboundedReceiver<FinishedSession>,
) -> JoinHandle<()> {
  tokio::spawn(async move {
    while let Some(done) = rx.recv().await {
      match api
        .record_session(&user_id, done.duration_seconds, PracticeType::Conversation, Some(&deck_id))
        .await
      {
        Ok(()) => info!(target: "practice", %deck_id, duration_seconds = done.duration_seconds, "Practice session recorded"),
        Err(e) => warn!(target: "practice", %deck_id, error = %e, "Failed to record practice session"),
      }
    }
  })
}

pub struct PracticeSession {
  id: Uuid,
  api: ApiClient,
  user_id: String,
  deck: Deck,
  settings: ConversationSettings,
  explain_template: String,
  messages: Vec<Message>,
  /// Deck words the assistant reported using, first-seen order, case-insensitively unique.
  used: Vec<String>,
  in_flight: bool,
  last_error: Option<String>,
  timer: SessionTimer,
  recorder: JoinHandle<()>,
}

impl PracticeSession {
  /// Load the deck, open the conversation, and start the clock.
  #[instrument(level = "info", skip(api, settings, cfg))]
  pub async fn start(
    api: ApiClient,
    user_id: &str,
    deck_id: &str,
    settings: ConversationSettings,
    cfg: &PracticeConfig,
  ) -> Result<Self, ApiError> {
    let deck = api.get_deck(deck_id).await?;
    let mut messages = vec![Message::user(cfg.opening_message.clone())];
    let reply = api.conversation_turn(user_id, &deck.id, &messages, true, &settings).await?;
    let words = reply.words_used.unwrap_or_default();

    let (tx, rx) = mpsc::unbounded_channel();
    let recorder = spawn_session_recorder(api.clone(), user_id.to_string(), deck.id.clone(), rx);
    let mut session = Self {
      id: Uuid::new_v4(),
      api,
      user_id: user_id.to_string(),
      deck,
      settings,
      explain_template: cfg.explain_template.clone(),
      messages: Vec::new(),
      used: Vec::new(),
      in_flight: false,
      last_error: None,
      timer: SessionTimer::start(tx),
      recorder,
    };
    session.note_words(&words);
    messages.push(Message::assistant(reply.message, words));
    session.messages = messages;
    info!(target: "practice", session = %session.id, deck_id = %session.deck.id, cards = session.deck.flashcards.len(), "Practice started");
    Ok(session)
  }

  pub fn id(&self) -> Uuid {
    self.id
  }

  pub fn deck(&self) -> &Deck {
    &self.deck
  }

  pub fn settings(&self) -> &ConversationSettings {
    &self.settings
  }

  pub fn messages(&self) -> &[Message] {
    &self.messages
  }

  pub fn words_used(&self) -> &[String] {
    &self.used
  }

  pub fn last_error(&self) -> Option<&str> {
    self.last_error.as_deref()
  }

  pub fn timer(&self) -> &SessionTimer {
    &self.timer
  }

  pub fn set_visible(&mut self, visible: bool) {
    self.timer.set_visible(visible);
  }

  /// Send a learner message and append the assistant's reply.
  pub async fn send(&mut self, text: &str) -> Result<&Message, ApiError> {
    let text = text.trim();
    if text.is_empty() {
      return Err(ApiError::Invalid("Message is empty".into()));
    }
    if self.in_flight {
      return Err(ApiError::Invalid("Still waiting for the previous reply".into()));
    }
    self.messages.push(Message::user(text));
    self.exchange(false).await
  }

  /// Re-issue the last request with the history as it stands.
  pub async fn retry(&mut self) -> Result<&Message, ApiError> {
    if self.in_flight {
      return Err(ApiError::Invalid("Still waiting for the previous reply".into()));
    }
    let is_first = self.messages.len() == 1;
    self.exchange(is_first).await
  }

  /// Ask the assistant to explain a word.
  pub async fn explain(&mut self, word: &str) -> Result<&Message, ApiError> {
    let word = word.trim();
    if word.is_empty() {
      return Err(ApiError::Invalid("Which word should be explained?".into()));
    }
    let msg = fill_template(&self.explain_template, &[("word", word)]);
    self.send(&msg).await
  }

  async fn exchange(&mut self, is_first: bool) -> Result<&Message, ApiError> {
    self.in_flight = true;
    let res = self
      .api
      .conversation_turn(&self.user_id, &self.deck.id, &self.messages, is_first, &self.settings)
      .await;
    self.in_flight = false;
    match res {
      Ok(out) => {
        let words = out.words_used.unwrap_or_default();
        self.note_words(&words);
        self.last_error = None;
        self.messages.push(Message::assistant(out.message, words));
        // Just pushed, so never empty.
        self.messages.last().ok_or_else(|| ApiError::Decode("empty history".into()))
      }
      Err(e) => {
        warn!(target: "practice", session = %self.id, error = %e, "Conversation turn failed");
        self.last_error = Some(e.to_string());
        Err(e)
      }
    }
  }

  fn note_words(&mut self, words: &[String]) {
    for w in words {
      let lw = w.to_lowercase();
      if !self.used.iter().any(|u| u.to_lowercase() == lw) {
        self.used.push(w.clone());
      }
    }
  }

  /// Deck fronts the assistant has not used yet.
  pub fn words_not_used(&self) -> Vec<String> {
    words_not_used(&self.deck, &self.used)
  }

  pub fn summary(&self) -> SessionSummary {
    SessionSummary {
      duration_seconds: self.timer.elapsed_secs(),
      words_used: self.used.len(),
      total_words: self.deck.flashcards.len(),
      messages: self.messages.len(),
      words_not_used: self.words_not_used(),
    }
  }

  /// Stop the clock (submitting the duration once) and produce the recap.
  pub fn end(&mut self) -> SessionSummary {
    self.timer.end();
    let summary = self.summary();
    info!(
      target: "practice",
      session = %self.id,
      duration_seconds = summary.duration_seconds,
      words_used = summary.words_used,
      total_words = summary.total_words,
      "Practice ended"
    );
    summary
  }

  /// Tear the session down and wait until the recorder has delivered the duration.
  pub async fn close(self) {
    let Self { timer, recorder, id, .. } = self;
    if !timer.is_finished() {
      info!(target: "practice", session = %id, elapsed_secs = timer.elapsed_secs(), "Practice left without ending");
    }
    drop(timer);
    if let Err(e) = recorder.await {
      warn!(target: "practice", session = %id, error = %e, "Session recorder task failed");
    }
  }
}

/// Deck fronts absent from `used`, compared case-insensitively, in deck order.
pub fn words_not_used(deck: &Deck, used: &[String]) -> Vec<String> {
  let used: Vec<String> = used.iter().map(|w| w.to_lowercase()).collect();
  deck
    .flashcards
    .iter()
    .filter(|c| !used.contains(&c.front.to_lowercase()))
    .map(|c| c.front.clone())
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::Flashcard;
  use crate::testutil::spawn_backend;
  use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
  };
  use serde_json::{json, Value};
  use std::sync::{Arc, Mutex};
  use std::time::Duration;

  #[derive(Clone, Default)]
  struct Backend {
    turns: Arc<Mutex<Vec<Value>>>,
    sessions: Arc<Mutex<Vec<Value>>>,
    fail_next: Arc<Mutex<bool>>,
  }

  async fn deck(Path(id): Path<String>) -> Json<Value> {
    Json(json!({
      "id": id, "title": "French", "count": 3, "difficulty": "easy",
      "flashcards": [
        {"front": "bonjour", "back": "hello"},
        {"front": "Chat", "back": "cat"},
        {"front": "chien", "back": "dog"}
      ]
    }))
  }

  async fn turn(State(b): State<Backend>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    b.turns.lock().unwrap().push(body.clone());
    if std::mem::take(&mut *b.fail_next.lock().unwrap()) {
      return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"detail": "model unavailable"})));
    }
    let n = body["messages"].as_array().map(|a| a.len()).unwrap_or(0);
    let words = if n == 1 { json!(["bonjour"]) } else { json!(["chat"]) };
    (StatusCode::OK, Json(json!({"message": format!("reply {}", n), "words_used": words})))
  }

  async fn record(State(b): State<Backend>, Json(body): Json<Value>) -> StatusCode {
    b.sessions.lock().unwrap().push(body);
    StatusCode::CREATED
  }

  async fn backend() -> (ApiClient, Backend) {
    let b = Backend::default();
    let app = Router::new()
      .route("/api/decks/:id", get(deck))
      .route("/api/practice/conversation", post(turn))
      .route("/api/practice/sessions", post(record))
      .with_state(b.clone());
    let base = spawn_backend(app).await;
    (ApiClient::new(base, Duration::from_secs(5)).unwrap(), b)
  }

  #[tokio::test]
  async fn conversation_flow_and_recording() {
    let (api, b) = backend().await;
    let mut s = PracticeSession::start(api, "u1", "d1", ConversationSettings::default(), &PracticeConfig::default())
      .await
      .unwrap();

    assert_eq!(s.messages().len(), 2);
    assert_eq!(s.messages()[0].content, "Hello! I'm ready to practice my vocabulary.");
    assert_eq!(s.messages()[1].content, "reply 1");
    {
      let turns = b.turns.lock().unwrap();
      assert_eq!(turns[0]["is_first_message"], true);
      assert_eq!(turns[0]["deck_id"], "d1");
      assert_eq!(turns[0]["settings"]["focusMode"], "deck-focused");
    }

    assert!(s.send("   ").await.is_err());
    let reply = s.send(" Le chat est noir ").await.unwrap();
    assert_eq!(reply.content, "reply 3");
    assert_eq!(s.messages()[2].content, "Le chat est noir");
    assert_eq!(b.turns.lock().unwrap()[1]["is_first_message"], false);

    // "chat" used against the "Chat" front.
    assert_eq!(s.words_not_used(), vec!["chien".to_string()]);

    let summary = s.end();
    assert_eq!(summary.total_words, 3);
    assert_eq!(summary.words_used, 2);
    assert_eq!(summary.messages, 4);
    s.close().await;
    let expected = if summary.duration_seconds > 0 { 1 } else { 0 };
    assert_eq!(b.sessions.lock().unwrap().len(), expected);
  }

  #[tokio::test]
  async fn failed_turn_keeps_message_and_retry_resends() {
    let (api, b) = backend().await;
    let mut s = PracticeSession::start(api, "u1", "d1", ConversationSettings::default(), &PracticeConfig::default())
      .await
      .unwrap();

    *b.fail_next.lock().unwrap() = true;
    let err = s.send("bonjour").await.unwrap_err();
    assert_eq!(err.to_string(), "model unavailable");
    assert_eq!(s.last_error(), Some("model unavailable"));
    assert_eq!(s.messages().len(), 3);
    assert!(!s.in_flight);

    let reply = s.retry().await.unwrap();
    assert_eq!(reply.content, "reply 3");
    assert_eq!(s.messages().len(), 4);
    assert!(s.last_error().is_none());
    let turns = b.turns.lock().unwrap();
    assert_eq!(turns[1]["messages"], turns[2]["messages"]);
  }

  #[tokio::test]
  async fn explain_uses_template() {
    let (api, b) = backend().await;
    let mut s = PracticeSession::start(api, "u1", "d1", ConversationSettings::default(), &PracticeConfig::default())
      .await
      .unwrap();
    s.explain("chien").await.unwrap();
    let turns = b.turns.lock().unwrap();
    let last = turns.last().unwrap()["messages"].as_array().unwrap().last().unwrap().clone();
    assert_eq!(last["content"], "Can you explain the word \"chien\"?");
    assert_eq!(last["role"], "user");
  }

  #[tokio::test]
  async fn teardown_records_elapsed_time_once() {
    let (api, b) = backend().await;
    let mut s = PracticeSession::start(api, "u1", "d1", ConversationSettings::default(), &PracticeConfig::default())
      .await
      .unwrap();
    tokio::time::sleep(Duration::from_millis(1100)).await;
    s.set_visible(false);
    tokio::time::sleep(Duration::from_millis(1100)).await;
    s.close().await;

    let sessions = b.sessions.lock().unwrap();
    assert_eq!(sessions.len(), 1);
    let secs = sessions[0]["duration_seconds"].as_u64().unwrap();
    assert!((1..2).contains(&secs), "hidden time counted: {secs}");
    assert_eq!(sessions[0]["practice_type"], "conversation");
    assert_eq!(sessions[0]["deck_id"], "d1");
  }

  #[test]
  fn not_used_is_case_insensitive() {
    let deck = Deck {
      id: "d".into(),
      title: String::new(),
      flashcards: vec![
        Flashcard { front: "Bonjour".into(), back: "hello".into() },
        Flashcard { front: "merci".into(), back: "thanks".into() },
      ],
      count: 2,
      difficulty: String::new(),
    };
    assert_eq!(words_not_used(&deck, &["BONJOUR".to_string()]), vec!["merci".to_string()]);
    assert!(words_not_used(&deck, &["merci".into(), "bonjour".into()]).is_empty());
  }
}
