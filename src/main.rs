//! lingodeck · vocabulary flashcards and conversation practice in the terminal
//!
//! - Generate flashcards from your own texts, keep them as decks and words
//! - Study decks card by card
//! - Practice conversations with an AI partner that highlights deck words
//!
//! Important env variables:
//!   LINGODECK_CONFIG_PATH  : path to TOML config (backend, identity service, speech, practice)
//!   LINGODECK_API_URL      : backend base URL (default "http://localhost:8000")
//!   LINGODECK_IDENTITY_URL : identity service project URL
//!   LINGODECK_IDENTITY_KEY : identity service public (anon) key
//!   LINGODECK_DATA_DIR     : where the session and cached settings live
//!   LOG_LEVEL              : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT             : "pretty" (default) or "json"

mod telemetry;
mod util;
mod error;
mod domain;
mod config;
mod protocol;
mod api;
mod storage;
mod auth;
mod state;
mod logic;
mod highlight;
mod timer;
mod speech;
mod practice;
mod commands;
#[cfg(test)]
mod testutil;

use std::error::Error;

use clap::Parser;
use tracing::instrument;

use crate::commands::Cli;
use crate::config::AppConfig;
use crate::state::AppState;

#[tokio::main]
async fn main() {
  telemetry::init_tracing();
  let cli = Cli::parse();
  if let Err(err) = run(cli).await {
    eprintln!("error: {err}");
    std::process::exit(1);
  }
}

#[instrument(level = "info", skip_all)]
async fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
  // Config from TOML + env, then restore the stored session.
  let config = AppConfig::load();
  let mut state = AppState::new(config)?;
  commands::run(cli, &mut state).await
}
