//! Command-line surface: one subcommand per page of the client.
//!
//! Handlers are thin wrappers that gate on the signed-in user, call the backend and
//! print either a human-readable view or, with `--json`, the raw payload.

use std::error::Error;
use std::io::{BufRead, Write};
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;

use crate::domain::{Difficulty, FocusMode, SessionLength};
use crate::protocol::DeckSort;
use crate::state::AppState;

pub mod library;
pub mod practice;

#[derive(Parser, Debug)]
#[command(name = "lingodeck", about = "Vocabulary flashcards and conversation practice", version)]
pub struct Cli {
  /// Emit JSON instead of human-readable output.
  #[arg(long, global = true)]
  pub json: bool,

  #[command(subcommand)]
  pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
  /// Generate flashcards from a text, preview them, and optionally save them.
  Generate(GenerateArgs),
  /// Your saved decks.
  #[command(subcommand)]
  Decks(DeckCommand),
  /// Your saved words.
  #[command(subcommand)]
  Words(WordCommand),
  /// Today's practice time against the daily goal.
  Stats,
  /// Daily goal and conversation settings.
  #[command(subcommand)]
  Settings(SettingsCommand),
  /// Conversation practice with a deck.
  Practice(PracticeArgs),
  /// Create an account.
  Signup {
    email: String,
    /// Prompted for when omitted.
    #[arg(long)]
    password: Option<String>,
  },
  /// Sign in and remember the session.
  Signin {
    email: String,
    /// Prompted for when omitted.
    #[arg(long)]
    password: Option<String>,
  },
  /// Forget the stored session.
  Signout,
  /// Show the signed-in user.
  Whoami,
}

#[derive(Args, Debug)]
pub struct GenerateArgs {
  /// Source text. Ignored when --file is given.
  pub text: Vec<String>,
  /// Read the source text from a file.
  #[arg(short, long)]
  pub file: Option<PathBuf>,
  #[arg(short, long, value_enum, default_value_t = Difficulty::Medium)]
  pub difficulty: Difficulty,
  /// Cards to keep, 1-based ("1,3,5" or "2-4"). All by default.
  #[arg(long)]
  pub select: Option<String>,
  /// Save the selected cards as a new deck with this title.
  #[arg(long, value_name = "TITLE")]
  pub save_deck: Option<String>,
  /// Save the selected cards to your words.
  #[arg(long)]
  pub save_words: bool,
  /// Review the selection card by card before saving.
  #[arg(short, long)]
  pub interactive: bool,
}

#[derive(Subcommand, Debug)]
pub enum DeckCommand {
  /// List decks.
  List {
    #[arg(long)]
    search: Option<String>,
    #[arg(long, value_enum, default_value_t = DeckSort::CreatedAt)]
    sort: DeckSort,
  },
  /// Show a deck's cards.
  Show { id: String },
  /// Rename a deck.
  Rename { id: String, title: String },
  /// Delete a deck.
  Delete {
    id: String,
    /// Skip the confirmation prompt.
    #[arg(long)]
    yes: bool,
  },
  /// Study a deck card by card.
  Study {
    id: String,
    #[arg(long)]
    shuffle: bool,
  },
  /// Save a deck's cards to your words.
  SaveWords {
    id: String,
    /// Cards to save, 1-based. All by default.
    #[arg(long)]
    select: Option<String>,
    /// Review the selection before saving.
    #[arg(short, long)]
    interactive: bool,
  },
}

#[derive(Subcommand, Debug)]
pub enum WordCommand {
  /// List words, newest first.
  List {
    #[arg(long, default_value_t = 1)]
    page: u32,
    #[arg(long, default_value_t = 20)]
    page_size: u32,
    #[arg(long)]
    search: Option<String>,
  },
  /// Add a word.
  Add {
    word: String,
    definition: String,
    #[arg(long, default_value = "")]
    example: String,
    #[arg(long, default_value = "")]
    pronunciation: String,
  },
  /// Replace a word's fields.
  Edit {
    id: String,
    word: String,
    definition: String,
    #[arg(long, default_value = "")]
    example: String,
    #[arg(long, default_value = "")]
    pronunciation: String,
  },
  /// Delete a word.
  Delete {
    id: String,
    #[arg(long)]
    yes: bool,
  },
}

#[derive(Subcommand, Debug)]
pub enum SettingsCommand {
  /// Show the daily goal and the cached conversation settings.
  Show,
  /// Set the daily practice goal in minutes.
  SetGoal { minutes: u32 },
}

#[derive(Args, Debug)]
pub struct PracticeArgs {
  pub deck_id: String,
  /// How much of the target language the assistant uses (0-100).
  #[arg(long, allow_negative_numbers = true)]
  pub immersion: Option<i64>,
  #[arg(long, value_enum)]
  pub focus: Option<FocusMode>,
  #[arg(long)]
  pub topic: Option<String>,
  #[arg(long, value_enum)]
  pub length: Option<SessionLength>,
  /// Remember these settings for future sessions.
  #[arg(long)]
  pub save_settings: bool,
}

pub async fn run(cli: Cli, state: &mut AppState) -> Result<(), Box<dyn Error>> {
  let as_json = cli.json;
  match cli.command {
    Command::Generate(args) => library::generate(state, args, as_json).await,
    Command::Decks(cmd) => library::decks(state, cmd, as_json).await,
    Command::Words(cmd) => library::words(state, cmd, as_json).await,
    Command::Stats => library::stats(state, as_json).await,
    Command::Settings(cmd) => library::settings(state, cmd, as_json).await,
    Command::Practice(args) => practice::run(state, args, as_json).await,
    Command::Signup { email, password } => library::signup(state, &email, password, as_json).await,
    Command::Signin { email, password } => library::signin(state, &email, password, as_json).await,
    Command::Signout => library::signout(state).await,
    Command::Whoami => library::whoami(state, as_json),
  }
}

pub(crate) fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), Box<dyn Error>> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}

/// Read one line from stdin after printing `label`. `None` on end of input.
pub(crate) fn prompt_line(label: &str) -> std::io::Result<Option<String>> {
  print!("{}", label);
  std::io::stdout().flush()?;
  let mut line = String::new();
  if std::io::stdin().lock().read_line(&mut line)? == 0 {
    return Ok(None);
  }
  Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}

pub(crate) fn confirm(question: &str) -> std::io::Result<bool> {
  let answer = prompt_line(&format!("{} [y/N] ", question))?.unwrap_or_default();
  Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}
