//! Process-backed speech backends and capability probing.

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{AudioRecorder, Backend, Recognizer, SpeechError, SpeechInput, TranscriptEvent};
use crate::api::Transcriber;
use crate::config::SpeechConfig;
use crate::util::trunc_for_log;

/// How long a stopped recognizer may keep flushing output before its readers are cut off.
const READER_GRACE: Duration = Duration::from_millis(500);

/// Pick the best available backend: native recognizer, else recorder + upload.
pub fn speech_input_from_config(cfg: &SpeechConfig, transcriber: Arc<dyn Transcriber>) -> SpeechInput {
  let backend = if available(&cfg.recognizer) {
    Backend::Native(Box::new(CommandRecognizer::new(cfg.recognizer.clone())))
  } else if available(&cfg.recorder) {
    Backend::Recording {
      recorder: Box::new(CommandRecorder::new(cfg.recorder.clone())),
      transcriber,
      mime: cfg.mime.clone(),
    }
  } else {
    Backend::Unavailable
  };
  info!(target: "speech", backend = backend.name(), "Speech input probed");
  SpeechInput::new(backend, Duration::from_secs(cfg.error_dismiss_secs))
}

fn available(argv: &[String]) -> bool {
  argv.first().map(|p| program_on_path(p)).unwrap_or(false)
}

/// Whether `program` resolves to a file, either as a path or through `PATH`.
pub fn program_on_path(program: &str) -> bool {
  if program.contains(std::path::MAIN_SEPARATOR) {
    return Path::new(program).is_file();
  }
  std::env::var_os("PATH")
    .map(|paths| std::env::split_paths(&paths).any(|dir| dir.join(program).is_file()))
    .unwrap_or(false)
}

fn spawn(argv: &[String]) -> Result<Child, SpeechError> {
  let (program, args) = argv.split_first().ok_or(SpeechError::Unsupported)?;
  Command::new(program)
    .args(args)
    .stdin(Stdio::null())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .kill_on_drop(true)
    .spawn()
    .map_err(|e| SpeechError::from_io(&e))
}

/// Wait briefly for a reader task, then abort it. A grandchild can keep the pipe open.
async fn finish_reader<T>(mut handle: JoinHandle<T>) {
  if tokio::time::timeout(READER_GRACE, &mut handle).await.is_err() {
    debug!(target: "speech", "Speech output still open after stop, abandoning it");
    handle.abort();
    let _ = handle.await;
  }
}

async fn halt(child: &mut Child) {
  // Already exited is fine.
  let _ = child.start_kill();
  if let Err(e) = child.wait().await {
    debug!(target: "speech", error = %e, "Waiting on speech process failed");
  }
}

/// One recognizer output line: `partial:<text>`, `error:<code>`, or final text.
pub fn parse_recognizer_line(line: &str) -> Option<TranscriptEvent> {
  let line = line.trim();
  if line.is_empty() {
    return None;
  }
  if let Some(rest) = line.strip_prefix("partial:") {
    return Some(TranscriptEvent::Interim(rest.trim().to_string()));
  }
  if let Some(code) = line.strip_prefix("error:") {
    return Some(TranscriptEvent::Error(SpeechError::from_code(code)));
  }
  Some(TranscriptEvent::Final(line.to_string()))
}

/// Classify a failed recorder by what it printed on stderr.
pub fn classify_recorder_stderr(stderr: &str) -> Option<SpeechError> {
  let s = stderr.to_ascii_lowercase();
  if s.trim().is_empty() {
    return None;
  }
  if s.contains("permission denied") {
    Some(SpeechError::PermissionDenied)
  } else if s.contains("no soundcards") || s.contains("no such file or directory") || s.contains("audio open error") {
    Some(SpeechError::NoMicrophone)
  } else {
    Some(SpeechError::Failed(stderr.trim().to_string()))
  }
}

pub struct CommandRecognizer {
  argv: Vec<String>,
  child: Option<Child>,
  reader: Option<JoinHandle<()>>,
  stderr: Option<JoinHandle<()>>,
}

impl CommandRecognizer {
  pub fn new(argv: Vec<String>) -> Self {
    Self { argv, child: None, reader: None, stderr: None }
  }
}

impl Recognizer for CommandRecognizer {
  fn start(&mut self, events: mpsc::UnboundedSender<TranscriptEvent>) -> Result<(), SpeechError> {
    let mut child = spawn(&self.argv)?;
    let stdout = child.stdout.take().ok_or_else(|| SpeechError::Failed("recognizer has no stdout".into()))?;
    if let Some(stderr) = child.stderr.take() {
      // Drained so a chatty recognizer never blocks on a full pipe.
      self.stderr = Some(tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).split(b'\n');
        while let Ok(Some(line)) = lines.next_segment().await {
          let line = String::from_utf8_lossy(&line);
          debug!(target: "speech", line = %trunc_for_log(line.trim_end(), 120), "Recognizer stderr");
        }
      }));
    }
    self.reader = Some(tokio::spawn(async move {
      let mut lines = BufReader::new(stdout).lines();
      loop {
        match lines.next_line().await {
          Ok(Some(line)) => {
            if let Some(ev) = parse_recognizer_line(&line) {
              if events.send(ev).is_err() {
                break;
              }
            }
          }
          Ok(None) => break,
          Err(e) => {
            let _ = events.send(TranscriptEvent::Error(SpeechError::Failed(e.to_string())));
            break;
          }
        }
      }
    }));
    self.child = Some(child);
    Ok(())
  }

  fn stop(&mut self) -> BoxFuture<'_, ()> {
    Box::pin(async move {
      if let Some(mut child) = self.child.take() {
        halt(&mut child).await;
      }
      let reader = self.reader.take();
      let stderr = self.stderr.take();
      tokio::join!(
        async {
          if let Some(h) = reader {
            finish_reader(h).await;
          }
        },
        async {
          if let Some(h) = stderr {
            finish_reader(h).await;
          }
        },
      );
    })
  }
}

pub struct CommandRecorder {
  argv: Vec<String>,
  child: Option<Child>,
  audio: Option<JoinHandle<std::io::Result<Vec<u8>>>>,
  stderr: Option<JoinHandle<String>>,
}

impl CommandRecorder {
  pub fn new(argv: Vec<String>) -> Self {
    Self { argv, child: None, audio: None, stderr: None }
  }
}

impl AudioRecorder for CommandRecorder {
  fn start(&mut self) -> Result<(), SpeechError> {
    let mut child = spawn(&self.argv)?;
    let mut stdout = child.stdout.take().ok_or_else(|| SpeechError::Failed("recorder has no stdout".into()))?;
    let stderr = child.stderr.take();
    self.audio = Some(tokio::spawn(async move {
      let mut buf = Vec::new();
      stdout.read_to_end(&mut buf).await?;
      Ok(buf)
    }));
    self.stderr = Some(tokio::spawn(async move {
      let mut s = String::new();
      if let Some(mut err) = stderr {
        let _ = err.read_to_string(&mut s).await;
      }
      s
    }));
    self.child = Some(child);
    Ok(())
  }

  fn stop(&mut self) -> BoxFuture<'_, Result<Vec<u8>, SpeechError>> {
    Box::pin(async move {
      let mut child = self.child.take().ok_or_else(|| SpeechError::Failed("recorder not started".into()))?;
      halt(&mut child).await;

      let audio = match self.audio.take() {
        Some(h) => h
          .await
          .map_err(|e| SpeechError::Failed(e.to_string()))?
          .map_err(|e| SpeechError::Failed(e.to_string()))?,
        None => Vec::new(),
      };
      let stderr = match self.stderr.take() {
        Some(h) => h.await.unwrap_or_default(),
        None => String::new(),
      };
      if audio.is_empty() {
        if let Some(e) = classify_recorder_stderr(&stderr) {
          warn!(target: "speech", stderr = %stderr.trim(), "Recorder produced no audio");
          return Err(e);
        }
      }
      debug!(target: "speech", bytes = audio.len(), "Recording captured");
      Ok(audio)
    })
  }
}
