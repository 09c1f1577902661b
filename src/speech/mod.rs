//! Speech input for the practice prompt.
//!
//! The adapter exposes start / stop / is-listening / last-error and picks a backend
//! from what the machine offers:
//!   - native continuous recognition (interim + final transcript events), or
//!   - raw audio recording, uploaded to the transcription endpoint on stop, or
//!   - nothing, in which case starting fails with the "not supported" error.
//!
//! Errors are reduced to a small fixed set of learner-facing messages and dismiss
//! themselves after a few seconds.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::api::Transcriber;

pub mod command;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SpeechError {
  #[error("Microphone access denied. Please allow microphone access and try again.")]
  PermissionDenied,
  #[error("No microphone found. Please check your audio input device.")]
  NoMicrophone,
  #[error("No speech detected. Please try again.")]
  NoSpeech,
  #[error("Speech input is not supported on this system.")]
  Unsupported,
  /// Anything else; the detail goes to the logs, not to the learner.
  #[error("Speech recognition failed. Please try again.")]
  Failed(String),
}

impl SpeechError {
  /// Map a recognizer error code (Web Speech naming) to the fixed set.
  pub fn from_code(code: &str) -> Self {
    match code.trim() {
      "not-allowed" | "service-not-allowed" => SpeechError::PermissionDenied,
      "audio-capture" => SpeechError::NoMicrophone,
      "no-speech" => SpeechError::NoSpeech,
      other => SpeechError::Failed(other.to_string()),
    }
  }

  pub fn from_io(e: &std::io::Error) -> Self {
    match e.kind() {
      std::io::ErrorKind::PermissionDenied => SpeechError::PermissionDenied,
      std::io::ErrorKind::NotFound => SpeechError::Unsupported,
      _ => SpeechError::Failed(e.to_string()),
    }
  }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TranscriptEvent {
  Interim(String),
  Final(String),
  Error(SpeechError),
}

/// Continuous recognizer streaming transcript events.
pub trait Recognizer: Send {
  fn start(&mut self, events: mpsc::UnboundedSender<TranscriptEvent>) -> Result<(), SpeechError>;
  /// Stop and flush: every event produced before stopping is in the channel afterwards.
  fn stop(&mut self) -> BoxFuture<'_, ()>;
}

/// Raw audio capture for the upload fallback.
pub trait AudioRecorder: Send {
  fn start(&mut self) -> Result<(), SpeechError>;
  /// Stop capturing and hand back the recorded bytes.
  fn stop(&mut self) -> BoxFuture<'_, Result<Vec<u8>, SpeechError>>;
}

pub enum Backend {
  Native(Box<dyn Recognizer>),
  Recording { recorder: Box<dyn AudioRecorder>, transcriber: Arc<dyn Transcriber>, mime: String },
  Unavailable,
}

impl Backend {
  pub fn name(&self) -> &'static str {
    match self {
      Backend::Native(_) => "native",
      Backend::Recording { .. } => "recording",
      Backend::Unavailable => "unavailable",
    }
  }
}

pub struct SpeechInput {
  backend: Backend,
  listening: bool,
  events: Option<mpsc::UnboundedReceiver<TranscriptEvent>>,
  transcript: String,
  interim: String,
  last_error: Option<(SpeechError, Instant)>,
  dismiss_after: Duration,
}

impl SpeechInput {
  pub fn new(backend: Backend, dismiss_after: Duration) -> Self {
    Self {
      backend,
      listening: false,
      events: None,
      transcript: String::new(),
      interim: String::new(),
      last_error: None,
      dismiss_after,
    }
  }

  pub fn backend_name(&self) -> &'static str {
    self.backend.name()
  }

  pub fn is_listening(&self) -> bool {
    self.listening
  }

  /// Most recent error, until it is auto-dismissed.
  pub fn last_error(&self) -> Option<&SpeechError> {
    match &self.last_error {
      Some((e, at)) if at.elapsed() < self.dismiss_after => Some(e),
      _ => None,
    }
  }

  /// Finalized text so far (native backend only).
  pub fn transcript(&self) -> &str {
    &self.transcript
  }

  /// Latest interim hypothesis (native backend only).
  pub fn interim(&self) -> &str {
    &self.interim
  }

  fn fail(&mut self, e: SpeechError) -> SpeechError {
    match &e {
      SpeechError::Failed(detail) => warn!(target: "speech", %detail, "Speech input failed"),
      other => info!(target: "speech", error = %other, "Speech input error"),
    }
    self.last_error = Some((e.clone(), Instant::now()));
    e
  }

  pub fn start_listening(&mut self) -> Result<(), SpeechError> {
    if self.listening {
      return Ok(());
    }
    self.transcript.clear();
    self.interim.clear();
    self.last_error = None;

    let started = match &mut self.backend {
      Backend::Native(rec) => {
        let (tx, rx) = mpsc::unbounded_channel();
        rec.start(tx).map(|_| self.events = Some(rx))
      }
      Backend::Recording { recorder, .. } => recorder.start(),
      Backend::Unavailable => Err(SpeechError::Unsupported),
    };
    match started {
      Ok(()) => {
        self.listening = true;
        debug!(target: "speech", backend = self.backend.name(), "Listening");
        Ok(())
      }
      Err(e) => Err(self.fail(e)),
    }
  }

  /// Apply pending native events. Returns true when the transcript or interim changed.
  /// A recognizer error ends the listening session.
  pub async fn pump(&mut self) -> bool {
    let mut changed = false;
    let mut error = None;
    if let Some(rx) = self.events.as_mut() {
      while let Ok(ev) = rx.try_recv() {
        match ev {
          TranscriptEvent::Interim(t) => {
            self.interim = t;
            changed = true;
          }
          TranscriptEvent::Final(t) => {
            if !t.is_empty() {
              if !self.transcript.is_empty() {
                self.transcript.push(' ');
              }
              self.transcript.push_str(&t);
            }
            self.interim.clear();
            changed = true;
          }
          TranscriptEvent::Error(e) => {
            error = Some(e);
            break;
          }
        }
      }
    }
    if let Some(e) = error {
      if let Backend::Native(rec) = &mut self.backend {
        rec.stop().await;
      }
      self.listening = false;
      self.events = None;
      self.fail(e);
    }
    changed
  }

  /// Stop listening and return the recognized text. `Ok(None)` when not listening.
  pub async fn stop_listening(&mut self) -> Result<Option<String>, SpeechError> {
    if !self.listening {
      return Ok(None);
    }
    self.listening = false;

    let text = match &mut self.backend {
      Backend::Native(rec) => {
        rec.stop().await;
        // Leave listening on while draining so a trailing error is still reported.
        self.listening = true;
        self.pump().await;
        let errored = !self.listening;
        self.listening = false;
        self.events = None;
        if errored {
          return Err(self.last_error.as_ref().map(|(e, _)| e.clone()).unwrap_or(SpeechError::NoSpeech));
        }
        let t = if self.transcript.trim().is_empty() { self.interim.clone() } else { self.transcript.clone() };
        Ok(t)
      }
      Backend::Recording { recorder, transcriber, mime } => match recorder.stop().await {
        Ok(audio) if audio.is_empty() => Err(SpeechError::NoSpeech),
        Ok(audio) => {
          debug!(target: "speech", audio_len = audio.len(), "Uploading recording for transcription");
          transcriber
            .transcribe(audio, mime)
            .await
            .map_err(|e| SpeechError::Failed(e.to_string()))
        }
        Err(e) => Err(e),
      },
      Backend::Unavailable => Err(SpeechError::Unsupported),
    };

    match text {
      Ok(t) if t.trim().is_empty() => Err(self.fail(SpeechError::NoSpeech)),
      Ok(t) => {
        self.interim.clear();
        Ok(Some(t.trim().to_string()))
      }
      Err(e) => Err(self.fail(e)),
    }
  }
}

impl Drop for SpeechInput {
  fn drop(&mut self) {
    if self.listening {
      debug!(target: "speech", "Dropped while listening; releasing input");
      // Native recognizers and recorders kill their processes on drop.
      self.listening = false;
    }
  }
}
