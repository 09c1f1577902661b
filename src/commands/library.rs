//! Generate, decks, words, stats, settings and account commands.

use std::error::Error;

use serde_json::json;
use tracing::{info, instrument};

use super::{confirm, print_json, prompt_line, DeckCommand, GenerateArgs, SettingsCommand, WordCommand};
use crate::api::ApiClient;
use crate::auth::SignUpOutcome;
use crate::domain::{Deck, Flashcard, PracticeType};
use crate::logic::{
  batch_summary_lines, immersion_description, immersion_label, validate_source_text, words_to_save, Selection,
  StudyCursor,
};
use crate::protocol::{NewWord, WordUpdate};
use crate::state::AppState;
use crate::storage::cached_or_default_settings;
use crate::util::{format_clock, parse_index_list, plural};

type CmdResult = Result<(), Box<dyn Error>>;

fn print_cards(cards: &[Flashcard], selection: &Selection) {
  for (i, c) in cards.iter().enumerate() {
    let mark = if selection.is_selected(i) { 'x' } else { ' ' };
    println!("[{}] {:>3}. {}  ->  {}", mark, i + 1, c.front, c.back);
  }
  println!("{} of {} card{} selected", selection.count(), cards.len(), plural(cards.len()));
}

/// Toggle cards by number until an empty line: `a` selects or clears all.
fn review_selection(cards: &[Flashcard], mut selection: Selection) -> Result<Selection, Box<dyn Error>> {
  loop {
    print_cards(cards, &selection);
    let Some(input) = prompt_line("Toggle cards (e.g. 2,5), a for all, Enter when done: ")? else { break };
    match input.trim() {
      "" => break,
      "a" => selection.toggle_all(),
      picks => match parse_index_list(picks, cards.len()) {
        Ok(indices) => indices.into_iter().for_each(|i| selection.toggle(i)),
        Err(e) => eprintln!("{}", e),
      },
    }
  }
  Ok(selection)
}

fn selection_for(len: usize, select: Option<&str>) -> Result<Selection, String> {
  let mut s = Selection::all(len);
  if let Some(picks) = select {
    s.only(&parse_index_list(picks, len)?);
  }
  Ok(s)
}

async fn save_selected_words(api: &ApiClient, user_id: &str, cards: &[&Flashcard], as_json: bool) -> CmdResult {
  let words = words_to_save(cards, user_id);
  if words.is_empty() {
    return Err("No words selected to save".into());
  }
  let out = api.save_words_batch(user_id, &words).await?;
  if as_json {
    return print_json(&out);
  }
  for (is_error, line) in batch_summary_lines(&out) {
    if is_error {
      eprintln!("{}", line);
    } else {
      println!("{}", line);
    }
  }
  Ok(())
}

//
// Generate
//

#[instrument(level = "info", skip(state, args), fields(difficulty = args.difficulty.as_str()))]
pub async fn generate(state: &AppState, args: GenerateArgs, as_json: bool) -> CmdResult {
  let user_id = state.user_id("generate flashcards")?;
  let raw = match &args.file {
    Some(path) => tokio::fs::read_to_string(path).await?,
    None => args.text.join(" "),
  };
  let text = validate_source_text(&raw)?;
  if let Some(title) = &args.save_deck {
    if title.trim().is_empty() {
      return Err("Please enter a deck title".into());
    }
  }

  let api = state.api()?;
  let out = api.generate_flashcards(&user_id, text, args.difficulty.as_str()).await?;
  let mut selection = selection_for(out.flashcards.len(), args.select.as_deref())?;
  if args.interactive && !as_json {
    selection = review_selection(&out.flashcards, selection)?;
  }
  let picked = selection.pick(&out.flashcards);

  if as_json {
    print_json(&json!({
      "deck_id": out.deck_id,
      "count": out.count,
      "processing_time": out.processing_time,
      "flashcards": out.flashcards,
      "selected": picked,
    }))?;
  } else {
    println!("Generated {} flashcard{}:", out.flashcards.len(), plural(out.flashcards.len()));
    print_cards(&out.flashcards, &selection);
  }

  if let Some(title) = &args.save_deck {
    if picked.is_empty() {
      return Err("Please select at least one card".into());
    }
    let cards: Vec<Flashcard> = picked.iter().map(|c| (*c).clone()).collect();
    let deck_id = api.create_deck(&user_id, title.trim(), &cards, args.difficulty.as_str(), text).await?;
    info!(target: "lingodeck", %deck_id, cards = cards.len(), "Deck saved");
    if as_json {
      print_json(&json!({ "deck_id": deck_id }))?;
    } else {
      println!("Saved deck \"{}\" ({})", title.trim(), deck_id);
    }
  }
  if args.save_words {
    save_selected_words(&api, &user_id, &picked, as_json).await?;
  }
  Ok(())
}

//
// Decks
//

pub async fn decks(state: &AppState, cmd: DeckCommand, as_json: bool) -> CmdResult {
  let api = state.api()?;
  match cmd {
    DeckCommand::List { search, sort } => {
      let user_id = state.user_id("view your decks")?;
      let decks = api.list_decks(&user_id, sort, search.as_deref()).await?;
      if as_json {
        return print_json(&decks);
      }
      if decks.is_empty() {
        println!("No decks yet. Generate some flashcards to get started.");
      }
      for d in &decks {
        let created = d.created_at.map(|t| t.format("%Y-%m-%d").to_string()).unwrap_or_default();
        println!("{}  {}  ({} card{}, {})  {}", d.id, d.title, d.card_count, plural(d.card_count), d.difficulty, created);
      }
      Ok(())
    }
    DeckCommand::Show { id } => {
      state.user_id("view this deck")?;
      let deck = api.get_deck(&id).await?;
      if as_json {
        return print_json(&deck);
      }
      println!("{} ({}, {} card{})", deck.title, deck.difficulty, deck.count, plural(deck.count));
      print_cards(&deck.flashcards, &Selection::all(deck.flashcards.len()));
      Ok(())
    }
    DeckCommand::Rename { id, title } => {
      let user_id = state.user_id("rename decks")?;
      let title = title.trim();
      if title.is_empty() {
        return Err("Please enter a deck title".into());
      }
      api.rename_deck(&user_id, &id, title).await?;
      println!("Deck renamed to \"{}\"", title);
      Ok(())
    }
    DeckCommand::Delete { id, yes } => {
      let user_id = state.user_id("delete decks")?;
      if !yes && !confirm("Are you sure you want to delete this deck?")? {
        println!("Cancelled");
        return Ok(());
      }
      api.delete_deck(&user_id, &id).await?;
      println!("Deck deleted");
      Ok(())
    }
    DeckCommand::Study { id, shuffle } => {
      let user_id = state.user_id("study decks")?;
      let deck = api.get_deck(&id).await?;
      let started = std::time::Instant::now();
      study(&deck, shuffle)?;
      let secs = started.elapsed().as_secs();
      if secs > 0 {
        if let Err(e) = api.record_session(&user_id, secs, PracticeType::Flashcards, Some(&deck.id)).await {
          tracing::warn!(target: "lingodeck", deck_id = %deck.id, error = %e, "Failed to record study session");
        }
      }
      Ok(())
    }
    DeckCommand::SaveWords { id, select, interactive } => {
      let user_id = state.user_id("save words")?;
      let deck = api.get_deck(&id).await?;
      let mut selection = selection_for(deck.flashcards.len(), select.as_deref())?;
      if interactive {
        selection = review_selection(&deck.flashcards, selection)?;
      }
      save_selected_words(&api, &user_id, &selection.pick(&deck.flashcards), as_json).await
    }
  }
}

/// Flip-card loop: Enter flips, `n`/`p` move (wrapping), `q` quits.
fn study(deck: &Deck, shuffle: bool) -> CmdResult {
  let n = deck.flashcards.len();
  if n == 0 {
    println!("This deck has no cards.");
    return Ok(());
  }
  let mut cursor = if shuffle { StudyCursor::shuffled(n) } else { StudyCursor::new(n) };
  println!("{}: Enter flips, n next, p previous, q quits", deck.title);
  loop {
    let Some(card) = cursor.current().and_then(|i| deck.flashcards.get(i)) else { break };
    let side = if cursor.is_flipped() { &card.back } else { &card.front };
    let label = format!("({}/{}) {} > ", cursor.position() + 1, cursor.len(), side);
    let Some(input) = prompt_line(&label)? else { break };
    match input.trim() {
      "" => cursor.flip(),
      "n" => cursor.next(),
      "p" => cursor.prev(),
      "q" => break,
      other => println!("Unknown key '{}'", other),
    }
  }
  Ok(())
}

//
// Words
//

pub async fn words(state: &AppState, cmd: WordCommand, as_json: bool) -> CmdResult {
  let api = state.api()?;
  match cmd {
    WordCommand::List { page, page_size, search } => {
      let user_id = state.user_id("view your words")?;
      let words = api.list_words(&user_id, page.max(1), page_size.max(1), search.as_deref()).await?;
      if as_json {
        return print_json(&words);
      }
      if words.is_empty() {
        println!("No words found.");
      }
      for w in &words {
        println!("{}  {}: {}  [{}]", w.id, w.word, w.definition, w.status);
        if let Some(ex) = w.example.as_deref().filter(|e| !e.is_empty()) {
          println!("      e.g. {}", ex);
        }
      }
      Ok(())
    }
    WordCommand::Add { word, definition, example, pronunciation } => {
      let user_id = state.user_id("add words")?;
      if word.trim().is_empty() || definition.trim().is_empty() {
        return Err("Word and definition are required".into());
      }
      let new = NewWord { word: word.trim().into(), definition: definition.trim().into(), example, pronunciation, user_id };
      api.create_word(&new).await?;
      println!("Added \"{}\"", new.word);
      Ok(())
    }
    WordCommand::Edit { id, word, definition, example, pronunciation } => {
      let user_id = state.user_id("edit words")?;
      if word.trim().is_empty() || definition.trim().is_empty() {
        return Err("Word and definition are required".into());
      }
      let update = WordUpdate { word: word.trim().into(), definition: definition.trim().into(), example, pronunciation };
      api.update_word(&user_id, &id, &update).await?;
      println!("Word updated");
      Ok(())
    }
    WordCommand::Delete { id, yes } => {
      let user_id = state.user_id("delete words")?;
      if !yes && !confirm("Are you sure you want to delete this word?")? {
        println!("Cancelled");
        return Ok(());
      }
      api.delete_word(&user_id, &id).await?;
      println!("Word deleted");
      Ok(())
    }
  }
}

//
// Stats & settings
//

pub async fn stats(state: &AppState, as_json: bool) -> CmdResult {
  let user_id = state.user_id("view your stats")?;
  let stats = state.api()?.daily_stats(&user_id).await?;
  if as_json {
    return print_json(&stats);
  }
  let goal = stats
    .daily_goal_minutes
    .map(|g| format!(" of {} min goal{}", g, if stats.goal_met() { " (met!)" } else { "" }))
    .unwrap_or_default();
  println!("Today: {} practised{}", format_clock(stats.total_seconds), goal);
  println!("{} session{}", stats.sessions, plural(stats.sessions as usize));
  Ok(())
}

pub async fn settings(state: &AppState, cmd: SettingsCommand, as_json: bool) -> CmdResult {
  let user_id = state.user_id("change your settings")?;
  let api = state.api()?;
  match cmd {
    SettingsCommand::Show => {
      let user = api.get_user_settings(&user_id).await?;
      let conv = cached_or_default_settings(&state.store);
      if as_json {
        return print_json(&json!({ "daily_goal_minutes": user.daily_goal_minutes, "conversation": conv }));
      }
      println!("Daily goal: {} min", user.daily_goal_minutes);
      println!(
        "Conversation: immersion {} ({}), focus {:?}, topic {}, length {:?}",
        conv.immersion_level,
        immersion_label(conv.immersion_level),
        conv.focus_mode,
        conv.topic,
        conv.session_length
      );
      println!("  {}", immersion_description(conv.immersion_level));
      Ok(())
    }
    SettingsCommand::SetGoal { minutes } => {
      api.set_daily_goal(&user_id, minutes).await?;
      println!("Daily goal set to {} min", minutes);
      Ok(())
    }
  }
}

//
// Account
//

fn password_or_prompt(given: Option<String>, label: &str) -> Result<String, Box<dyn Error>> {
  match given {
    Some(p) => Ok(p),
    None => Ok(prompt_line(label)?.unwrap_or_default()),
  }
}

pub async fn signup(state: &mut AppState, email: &str, password: Option<String>, as_json: bool) -> CmdResult {
  let (password, confirm_pw) = match password {
    Some(p) => (p.clone(), p),
    None => (password_or_prompt(None, "Password: ")?, password_or_prompt(None, "Confirm password: ")?),
  };
  match state.auth.sign_up(email, &password, &confirm_pw).await? {
    SignUpOutcome::SignedIn(user) => {
      if as_json {
        return print_json(&user);
      }
      println!("Account created. Signed in as {}", user.email.as_deref().unwrap_or(&user.id));
    }
    SignUpOutcome::ConfirmationPending(user) => {
      if as_json {
        return print_json(&json!({ "confirmation_pending": true, "user": user }));
      }
      println!("Account created. Check your email to confirm it, then sign in.");
    }
  }
  Ok(())
}

pub async fn signin(state: &mut AppState, email: &str, password: Option<String>, as_json: bool) -> CmdResult {
  let password = password_or_prompt(password, "Password: ")?;
  let user = state.auth.sign_in(email, &password).await?;
  if as_json {
    return print_json(&user);
  }
  println!("Signed in as {}", user.email.as_deref().unwrap_or(&user.id));
  Ok(())
}

pub async fn signout(state: &mut AppState) -> CmdResult {
  state.auth.sign_out().await?;
  println!("Signed out");
  Ok(())
}

pub fn whoami(state: &AppState, as_json: bool) -> CmdResult {
  let user = state.auth.require_user("see who you are")?;
  if as_json {
    return print_json(user);
  }
  println!("{} ({})", user.email.as_deref().unwrap_or("no email"), user.id);
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn selection_rejects_cards_past_the_end() {
    let s = selection_for(3, Some("1,3")).unwrap();
    assert_eq!(s.count(), 2);
    assert!(s.is_selected(2));
    assert!(selection_for(3, None).unwrap().is_all());
    assert_eq!(selection_for(3, Some("4")).unwrap_err(), "There is no card 4 (the deck has 3)");
    assert!(selection_for(3, Some("0")).is_err());
    assert!(selection_for(3, Some("2-99999999999")).is_err());
  }
}
