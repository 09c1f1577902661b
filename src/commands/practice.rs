//! Interactive conversation practice.
//!
//! Reads the learner's lines and dispatches them, one reply per input, until `/end`,
//! `/quit`, end of input or Ctrl-C. Every exit path tears the session down, which
//! submits the practised time exactly once.

use std::error::Error;
use std::io::BufRead;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, instrument, warn};

use super::{print_json, PracticeArgs};
use crate::domain::{ConversationSettings, Message};
use crate::highlight::{parse_message_with_tags, plain_text, render_for_terminal};
use crate::logic::{clamp_immersion, immersion_label};
use crate::practice::{PracticeSession, SessionSummary};
use crate::speech::command::speech_input_from_config;
use crate::speech::SpeechInput;
use crate::state::AppState;
use crate::util::{format_clock, trunc_for_log};

const HELP: &str = "\
Type a message and press Enter to send it. Commands:
  /explain <word>   ask what a word means
  /retry            resend the last request
  /voice            start or stop speech input
  /pause, /hide     pause the session clock
  /resume, /show    resume the session clock
  /time             time practised so far
  /words            deck words used and not used yet
  /end              finish and show the summary
  /quit             leave without the summary";

enum Flow {
  Continue,
  End,
  Quit,
}

/// Apply command-line overrides on top of the cached or default settings.
pub fn settings_from_args(base: ConversationSettings, args: &PracticeArgs) -> ConversationSettings {
  let mut s = base;
  if let Some(level) = args.immersion {
    s.immersion_level = clamp_immersion(level);
  }
  if let Some(focus) = args.focus {
    s.focus_mode = focus;
  }
  if let Some(topic) = args.topic.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
    s.topic = topic.to_string();
  }
  if let Some(length) = args.length {
    s.session_length = length;
  }
  if args.save_settings {
    s.save_for_future = true;
  }
  s
}

fn print_reply(session: &PracticeSession, msg: &Message) {
  let segments = parse_message_with_tags(&msg.content, &session.deck().flashcards);
  debug!(target: "practice", reply = %trunc_for_log(&plain_text(&segments), 80), "Rendering reply");
  println!("\n{}\n", render_for_terminal(&segments));
}

fn print_summary(summary: &SessionSummary) {
  println!("Session complete!");
  println!("  Time practised: {}", format_clock(summary.duration_seconds));
  println!("  Words used: {} / {}", summary.words_used, summary.total_words);
  println!("  Messages: {}", summary.messages);
  if !summary.words_not_used.is_empty() {
    println!("  Not used yet: {}", summary.words_not_used.join(", "));
  }
}

/// Resolves once Ctrl-C was pressed. Never resolves if the signal cannot be watched.
async fn interrupted(rx: &mut watch::Receiver<bool>) {
  if rx.wait_for(|hit| *hit).await.is_err() {
    std::future::pending::<()>().await;
  }
}

fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
  let (tx, rx) = mpsc::unbounded_channel();
  // A plain thread so a pending read never holds up runtime shutdown.
  std::thread::spawn(move || {
    for line in std::io::stdin().lock().lines() {
      let Ok(line) = line else { break };
      if tx.send(line).is_err() {
        break;
      }
    }
  });
  rx
}

fn spawn_interrupt_watch() -> watch::Receiver<bool> {
  let (tx, rx) = watch::channel(false);
  tokio::spawn(async move {
    match tokio::signal::ctrl_c().await {
      Ok(()) => {
        let _ = tx.send(true);
        // Keep the sender alive so receivers see the final value.
        std::future::pending::<()>().await;
      }
      Err(e) => warn!(target: "practice", error = %e, "Cannot listen for Ctrl-C"),
    }
  });
  rx
}

#[instrument(level = "info", skip(state, args), fields(deck_id = %args.deck_id))]
pub async fn run(state: &mut AppState, args: PracticeArgs, as_json: bool) -> Result<(), Box<dyn Error>> {
  let user_id = state.user_id("practice")?;
  let settings = settings_from_args(crate::storage::cached_or_default_settings(&state.store), &args);
  if settings.save_for_future {
    state.store.save_settings(&settings)?;
  }

  let api = state.api()?;
  let mut speech = speech_input_from_config(&state.config.speech, Arc::new(api.clone()));

  println!("Starting practice...");
  let mut session = PracticeSession::start(api, &user_id, &args.deck_id, settings, &state.config.practice).await?;
  let target = session.settings().session_length.minutes();
  println!(
    "{}: {} card{} | immersion {} | {} | /help for commands",
    session.deck().title,
    session.deck().flashcards.len(),
    crate::util::plural(session.deck().flashcards.len()),
    immersion_label(session.settings().immersion_level),
    target.map(|m| format!("{} min session", m)).unwrap_or_else(|| "no time limit".into()),
  );
  if let Some(first) = session.messages().last() {
    print_reply(&session, first);
  }

  let mut lines = spawn_stdin_reader();
  let mut stop = spawn_interrupt_watch();
  let mut ticks = session.timer().subscribe();
  let mut speech_poll = tokio::time::interval(Duration::from_millis(250));
  let mut time_up_shown = false;

  let flow = loop {
    tokio::select! {
      _ = interrupted(&mut stop) => {
        info!(target: "practice", session = %session.id(), "Interrupted");
        break Flow::Quit;
      }
      line = lines.recv() => {
        let Some(line) = line else { break Flow::Quit };
        match handle_line(&mut session, &mut speech, &mut stop, &line).await {
          Flow::Continue => {}
          other => break other,
        }
      }
      _ = speech_poll.tick(), if speech.is_listening() => {
        if speech.pump().await {
          if speech.interim().is_empty() {
            println!("  > {}", speech.transcript());
          } else {
            println!("  ... {}", speech.interim());
          }
        }
        if !speech.is_listening() {
          if let Some(e) = speech.last_error() {
            eprintln!("{}", e);
          }
        }
      }
      changed = ticks.changed() => {
        if changed.is_err() {
          continue;
        }
        let secs = *ticks.borrow_and_update();
        if let Some(m) = target {
          if !time_up_shown && secs >= m * 60 {
            time_up_shown = true;
            println!("\n{} minutes are up. Keep going, or /end to see your summary.\n", m);
          }
        }
      }
    }
  };

  if let Flow::End = flow {
    let summary = session.end();
    if as_json {
      print_json(&summary)?;
    } else {
      print_summary(&summary);
    }
  }
  drop(speech);
  session.close().await;
  Ok(())
}

async fn handle_line(
  session: &mut PracticeSession,
  speech: &mut SpeechInput,
  stop: &mut watch::Receiver<bool>,
  line: &str,
) -> Flow {
  let line = line.trim();
  if line.is_empty() {
    return Flow::Continue;
  }
  let (cmd, rest) = match line.split_once(char::is_whitespace) {
    Some((c, r)) => (c, r.trim()),
    None => (line, ""),
  };
  debug!(target: "practice", input = %trunc_for_log(line, 60), "Input");

  match cmd {
    "/help" => println!("{}", HELP),
    "/end" => return Flow::End,
    "/quit" => return Flow::Quit,
    "/pause" | "/hide" => {
      session.set_visible(false);
      println!("Paused at {}", format_clock(session.timer().elapsed_secs()));
    }
    "/resume" | "/show" => {
      session.set_visible(true);
      println!("Resumed");
    }
    "/time" => {
      let state = if session.timer().is_visible() { "" } else { " (paused)" };
      println!("{}{}", format_clock(session.timer().elapsed_secs()), state);
    }
    "/words" => {
      let used = session.words_used();
      println!("Used: {}", if used.is_empty() { "-".to_string() } else { used.join(", ") });
      let unused = session.words_not_used();
      println!("Not used yet: {}", if unused.is_empty() { "-".to_string() } else { unused.join(", ") });
    }
    "/retry" => {
      if let Some(err) = session.last_error() {
        debug!(target: "practice", %err, "Retrying after failure");
      }
      return exchange(session, stop, Request::Retry).await;
    }
    "/explain" => {
      if rest.is_empty() {
        println!("Usage: /explain <word>");
      } else {
        return exchange(session, stop, Request::Explain(rest.to_string())).await;
      }
    }
    "/voice" => {
      if !speech.is_listening() {
        match speech.start_listening() {
          Ok(()) => println!("Listening... type /voice again to stop."),
          Err(e) => eprintln!("{}", e),
        }
      } else {
        match speech.stop_listening().await {
          Ok(Some(text)) => {
            println!("> {}", text);
            return exchange(session, stop, Request::Send(text)).await;
          }
          Ok(None) => {}
          Err(e) => eprintln!("{}", e),
        }
      }
    }
    c if c.starts_with('/') => println!("Unknown command {}. Type /help for the list.", c),
    _ => return exchange(session, stop, Request::Send(line.to_string())).await,
  }
  Flow::Continue
}

enum Request {
  Send(String),
  Retry,
  Explain(String),
}

/// One round trip, abandoned if Ctrl-C arrives first.
async fn exchange(session: &mut PracticeSession, stop: &mut watch::Receiver<bool>, req: Request) -> Flow {
  let result = tokio::select! {
    r = async {
      let reply = match &req {
        Request::Send(text) => session.send(text).await,
        Request::Retry => session.retry().await,
        Request::Explain(word) => session.explain(word).await,
      };
      reply.map(|m| m.clone())
    } => Some(r),
    _ = interrupted(stop) => None,
  };
  match result {
    None => Flow::Quit,
    Some(Ok(msg)) => {
      print_reply(session, &msg);
      Flow::Continue
    }
    Some(Err(e)) => {
      eprintln!("{} (type /retry to try again)", e);
      Flow::Continue
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::{FocusMode, SessionLength};

  fn args(immersion: Option<i64>, topic: Option<&str>) -> PracticeArgs {
    PracticeArgs {
      deck_id: "d1".into(),
      immersion,
      focus: Some(FocusMode::Natural),
      topic: topic.map(str::to_string),
      length: Some(SessionLength::Unlimited),
      save_settings: false,
    }
  }

  #[test]
  fn overrides_apply_on_top_of_cached_settings() {
    let cached = ConversationSettings { topic: "travel".into(), save_for_future: true, ..Default::default() };
    let s = settings_from_args(cached, &args(Some(140), Some("  ")));
    assert_eq!(s.immersion_level, 100);
    assert_eq!(s.focus_mode, FocusMode::Natural);
    assert_eq!(s.topic, "travel");
    assert_eq!(s.session_length, SessionLength::Unlimited);
    assert!(s.save_for_future);

    let s = settings_from_args(ConversationSettings::default(), &args(None, Some("food")));
    assert_eq!(s.immersion_level, 50);
    assert_eq!(s.topic, "food");
    assert!(!s.save_for_future);
  }
}
