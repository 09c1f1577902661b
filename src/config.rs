//! Loading client configuration (backend URL, identity service, speech commands, practice
//! templates) from TOML, with environment overrides applied on top.
//!
//! See `AppConfig` for the expected schema.

use std::path::PathBuf;

use serde::Deserialize;
use tracing::{error, info};

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000";

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct AppConfig {
  pub api_base_url: String,
  pub request_timeout_secs: u64,
  /// Directory holding the cached settings and the auth session.
  pub data_dir: Option<PathBuf>,
  pub identity: IdentityConfig,
  pub speech: SpeechConfig,
  pub practice: PracticeConfig,
}

impl Default for AppConfig {
  fn default() -> Self {
    Self {
      api_base_url: DEFAULT_API_BASE_URL.into(),
      request_timeout_secs: 20,
      data_dir: None,
      identity: IdentityConfig::default(),
      speech: SpeechConfig::default(),
      practice: PracticeConfig::default(),
    }
  }
}

/// GoTrue-style identity service (project URL + public anon key).
#[derive(Clone, Debug, Deserialize, Default)]
#[serde(default)]
pub struct IdentityConfig {
  pub url: Option<String>,
  pub anon_key: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
  /// Streaming recognizer command. Each stdout line is a final transcript segment,
  /// lines starting with `partial:` are interim results. Empty disables native recognition.
  pub recognizer: Vec<String>,
  /// Raw audio capture command writing a single recording to stdout until killed.
  pub recorder: Vec<String>,
  pub mime: String,
  pub error_dismiss_secs: u64,
}

impl Default for SpeechConfig {
  fn default() -> Self {
    Self {
      recognizer: Vec::new(),
      recorder: ["arecord", "-q", "-f", "S16_LE", "-r", "16000", "-c", "1", "-t", "wav"]
        .iter()
        .map(|s| s.to_string())
        .collect(),
      mime: "audio/wav".into(),
      error_dismiss_secs: 5,
    }
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct PracticeConfig {
  pub opening_message: String,
  pub explain_template: String,
}

impl Default for PracticeConfig {
  fn default() -> Self {
    Self {
      opening_message: "Hello! I'm ready to practice my vocabulary.".into(),
      explain_template: "Can you explain the word \"{word}\"?".into(),
    }
  }
}

impl AppConfig {
  /// Load from LINGODECK_CONFIG_PATH (if set), then apply env overrides.
  /// A missing or broken file is logged and defaults are used instead.
  pub fn load() -> Self {
    let mut cfg = load_from_env_path().unwrap_or_default();
    cfg.apply_env_overrides(|k| std::env::var(k).ok());
    cfg
  }

  fn apply_env_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
    if let Some(url) = var("LINGODECK_API_URL").filter(|s| !s.trim().is_empty()) {
      self.api_base_url = url;
    }
    if let Some(url) = var("LINGODECK_IDENTITY_URL") {
      self.identity.url = Some(url);
    }
    if let Some(key) = var("LINGODECK_IDENTITY_KEY") {
      self.identity.anon_key = Some(key);
    }
    if let Some(dir) = var("LINGODECK_DATA_DIR") {
      self.data_dir = Some(PathBuf::from(dir));
    }
    self.api_base_url = self.api_base_url.trim_end_matches('/').to_string();
  }

  /// Resolved storage directory (explicit setting, else the platform config dir).
  pub fn resolved_data_dir(&self) -> PathBuf {
    self
      .data_dir
      .clone()
      .or_else(|| dirs::config_dir().map(|d| d.join("lingodeck")))
      .unwrap_or_else(|| PathBuf::from(".lingodeck"))
  }
}

fn load_from_env_path() -> Option<AppConfig> {
  let path = std::env::var("LINGODECK_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<AppConfig>(&s) {
      Ok(cfg) => {
        info!(target: "lingodeck", %path, "Loaded client config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "lingodeck", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "lingodeck", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn partial_toml_keeps_defaults() {
    let cfg: AppConfig = toml::from_str(
      r#"
        api_base_url = "https://api.example.com"
        [speech]
        recorder = ["rec", "-t", "wav", "-"]
      "#,
    )
    .unwrap();
    assert_eq!(cfg.api_base_url, "https://api.example.com");
    assert_eq!(cfg.request_timeout_secs, 20);
    assert_eq!(cfg.speech.recorder[0], "rec");
    assert_eq!(cfg.speech.mime, "audio/wav");
    assert!(cfg.practice.explain_template.contains("{word}"));
  }

  #[test]
  fn env_overrides_win_and_trailing_slash_is_dropped() {
    let mut cfg = AppConfig::default();
    cfg.apply_env_overrides(|k| match k {
      "LINGODECK_API_URL" => Some("http://backend:9000/".into()),
      "LINGODECK_DATA_DIR" => Some("/tmp/ld".into()),
      _ => None,
    });
    assert_eq!(cfg.api_base_url, "http://backend:9000");
    assert_eq!(cfg.resolved_data_dir(), PathBuf::from("/tmp/ld"));
    assert!(cfg.identity.url.is_none());
  }

  #[test]
  fn blank_api_override_is_ignored() {
    let mut cfg = AppConfig::default();
    cfg.apply_env_overrides(|k| (k == "LINGODECK_API_URL").then(|| "  ".to_string()));
    assert_eq!(cfg.api_base_url, DEFAULT_API_BASE_URL);
  }
}
