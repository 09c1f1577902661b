//! Auth context: current user/session plus sign-up, sign-in and sign-out against a
//! GoTrue-style identity service. The session is kept in local storage so later
//! commands find it, and `require_user` is the gate commands put in front of
//! anything that needs a user.

use std::time::Duration;

use tracing::{info, instrument, warn};

use crate::api::{api_url, extract_error_detail};
use crate::config::IdentityConfig;
use crate::error::{ApiError, AuthError};
use crate::protocol::{AuthGrantOut, AuthUser, CredentialsIn};
use crate::storage::{LocalStore, StoredSession};

pub const MIN_PASSWORD_LEN: usize = 6;

/// Outcome of a sign-up: either signed in right away, or waiting on email confirmation.
#[derive(Debug, PartialEq, Eq)]
pub enum SignUpOutcome {
  SignedIn(AuthUser),
  ConfirmationPending(Option<AuthUser>),
}

pub struct AuthContext {
  client: reqwest::Client,
  identity: IdentityConfig,
  store: LocalStore,
  session: Option<StoredSession>,
}

impl AuthContext {
  /// Build the context and restore a previously stored session, if any.
  pub fn new(identity: IdentityConfig, store: LocalStore, timeout: Duration) -> Result<Self, AuthError> {
    let client = reqwest::Client::builder().timeout(timeout).build().map_err(ApiError::from)?;
    let session = match store.load_session() {
      Ok(s) => s,
      Err(e) => {
        warn!(target: "lingodeck", error = %e, "Stored session unreadable; starting signed out");
        None
      }
    };
    Ok(Self { client, identity, store, session })
  }

  pub fn user(&self) -> Option<&AuthUser> {
    self.session.as_ref().map(|s| &s.user)
  }

  pub fn access_token(&self) -> Option<&str> {
    self.session.as_ref().map(|s| s.access_token.as_str())
  }

  /// Gate: the current user, or a "you must be logged in to <action>" error.
  pub fn require_user(&self, action: &'static str) -> Result<&AuthUser, AuthError> {
    self.user().ok_or(AuthError::NotSignedIn(action))
  }

  fn endpoint(&self) -> Result<(&str, &str), AuthError> {
    match (&self.identity.url, &self.identity.anon_key) {
      (Some(url), Some(key)) if !url.is_empty() && !key.is_empty() => Ok((url.trim_end_matches('/'), key)),
      _ => Err(AuthError::NotConfigured),
    }
  }

  #[instrument(level = "info", skip(self, password, confirm))]
  pub async fn sign_up(&mut self, email: &str, password: &str, confirm: &str) -> Result<SignUpOutcome, AuthError> {
    validate_registration(email, password, confirm)?;
    let grant = self.post_credentials("/auth/v1/signup", email, password).await?;
    match grant.access_token.clone() {
      Some(token) => {
        let refresh = grant.refresh_token.clone();
        let user = grant.into_user().ok_or_else(|| AuthError::Service("Sign-up response had no user".into()))?;
        self.store_session(token, refresh, user.clone())?;
        info!(target: "lingodeck", user_id = %user.id, "Signed up and signed in");
        Ok(SignUpOutcome::SignedIn(user))
      }
      None => {
        info!(target: "lingodeck", "Signed up; confirmation pending");
        Ok(SignUpOutcome::ConfirmationPending(grant.into_user()))
      }
    }
  }

  #[instrument(level = "info", skip(self, password))]
  pub async fn sign_in(&mut self, email: &str, password: &str) -> Result<AuthUser, AuthError> {
    if email.trim().is_empty() || password.is_empty() {
      return Err(AuthError::Validation("Email and password are required".into()));
    }
    let grant = self.post_credentials("/auth/v1/token?grant_type=password", email, password).await?;
    let token = grant
      .access_token
      .clone()
      .ok_or_else(|| AuthError::Service("Sign-in response had no access token".into()))?;
    let refresh = grant.refresh_token.clone();
    let user = grant.into_user().ok_or_else(|| AuthError::Service("Sign-in response had no user".into()))?;
    self.store_session(token, refresh, user.clone())?;
    info!(target: "lingodeck", user_id = %user.id, "Signed in");
    Ok(user)
  }

  /// Revoke the token remotely (best effort) and forget the local session.
  #[instrument(level = "info", skip(self))]
  pub async fn sign_out(&mut self) -> Result<(), AuthError> {
    if let (Some(session), Ok((url, key))) = (&self.session, self.endpoint()) {
      let res = self
        .client
        .post(api_url(url, "/auth/v1/logout"))
        .header("apikey", key)
        .bearer_auth(&session.access_token)
        .send()
        .await;
      if let Err(e) = res {
        warn!(target: "lingodeck", error = %e, "Remote sign-out failed; clearing local session anyway");
      }
    }
    self.session = None;
    self.store.clear_session()?;
    Ok(())
  }

  async fn post_credentials(&self, path: &str, email: &str, password: &str) -> Result<AuthGrantOut, AuthError> {
    let (url, key) = self.endpoint()?;
    let res = self
      .client
      .post(api_url(url, path))
      .header("apikey", key)
      .json(&CredentialsIn { email: email.trim(), password })
      .send()
      .await
      .map_err(ApiError::from)?;
    let status = res.status();
    if !status.is_success() {
      let body = res.text().await.unwrap_or_default();
      let msg = extract_error_detail(&body).unwrap_or_else(|| format!("Error: {}", status.as_u16()));
      return Err(AuthError::Service(msg));
    }
    Ok(res.json::<AuthGrantOut>().await.map_err(ApiError::from)?)
  }

  fn store_session(&mut self, access_token: String, refresh_token: Option<String>, user: AuthUser) -> Result<(), AuthError> {
    let session = StoredSession { access_token, refresh_token, user };
    self.store.save_session(&session)?;
    self.session = Some(session);
    Ok(())
  }
}

/// Registration form checks, done before anything is sent.
pub fn validate_registration(email: &str, password: &str, confirm: &str) -> Result<(), AuthError> {
  if email.trim().is_empty() || !email.contains('@') {
    return Err(AuthError::Validation("Please enter a valid email address".into()));
  }
  if password != confirm {
    return Err(AuthError::Validation("Passwords do not match".into()));
  }
  if password.chars().count() < MIN_PASSWORD_LEN {
    return Err(AuthError::Validation(format!("Password must be at least {} characters", MIN_PASSWORD_LEN)));
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testutil::{spawn_backend, temp_dir};
  use axum::{
    extract::Query,
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
  };
  use std::collections::HashMap;

  fn identity(url: &str) -> IdentityConfig {
    IdentityConfig { url: Some(url.to_string()), anon_key: Some("anon".into()) }
  }

  #[test]
  fn registration_checks() {
    assert!(validate_registration("a@b.c", "secret1", "secret1").is_ok());
    assert_eq!(
      validate_registration("a@b.c", "secret1", "secret2").unwrap_err().to_string(),
      "Passwords do not match"
    );
    assert_eq!(
      validate_registration("a@b.c", "abc", "abc").unwrap_err().to_string(),
      "Password must be at least 6 characters"
    );
    assert!(validate_registration("nobody", "secret1", "secret1").is_err());
  }

  #[test]
  fn guard_blocks_without_user() {
    let ctx = AuthContext::new(IdentityConfig::default(), LocalStore::new(temp_dir()), Duration::from_secs(1)).unwrap();
    let err = ctx.require_user("generate flashcards").unwrap_err();
    assert_eq!(err.to_string(), "You must be logged in to generate flashcards");
  }

  #[tokio::test]
  async fn sign_in_persists_and_sign_out_clears() {
    let app = Router::new()
      .route(
        "/auth/v1/token",
        post(|headers: HeaderMap, Query(q): Query<HashMap<String, String>>, Json(v): Json<serde_json::Value>| async move {
          assert_eq!(headers.get("apikey").and_then(|h| h.to_str().ok()), Some("anon"));
          assert_eq!(q.get("grant_type").map(String::as_str), Some("password"));
          if v["password"] == "hunter22" {
            (StatusCode::OK, Json(serde_json::json!({
              "access_token": "tok-1", "refresh_token": "ref-1",
              "user": {"id": "user-1", "email": "a@b.c"}
            })))
          } else {
            (StatusCode::BAD_REQUEST, Json(serde_json::json!({
              "error": "invalid_grant", "error_description": "Invalid login credentials"
            })))
          }
        }),
      )
      .route("/auth/v1/logout", post(|| async { StatusCode::NO_CONTENT }));
    let base = spawn_backend(app).await;
    let dir = temp_dir();

    let mut ctx = AuthContext::new(identity(&base), LocalStore::new(&dir), Duration::from_secs(5)).unwrap();
    let err = ctx.sign_in("a@b.c", "wrong").await.unwrap_err();
    assert_eq!(err.to_string(), "Invalid login credentials");
    assert!(ctx.user().is_none());

    let user = ctx.sign_in("a@b.c", "hunter22").await.unwrap();
    assert_eq!(user.id, "user-1");
    assert_eq!(ctx.access_token(), Some("tok-1"));

    // A fresh context picks the stored session up.
    let restored = AuthContext::new(identity(&base), LocalStore::new(&dir), Duration::from_secs(5)).unwrap();
    assert_eq!(restored.require_user("practice").unwrap().id, "user-1");

    ctx.sign_out().await.unwrap();
    assert!(ctx.user().is_none());
    let after = AuthContext::new(identity(&base), LocalStore::new(&dir), Duration::from_secs(5)).unwrap();
    assert!(after.user().is_none());
  }

  #[tokio::test]
  async fn sign_up_without_session_waits_for_confirmation() {
    let app = Router::new().route(
      "/auth/v1/signup",
      post(|| async { Json(serde_json::json!({"id": "user-2", "email": "new@b.c"})) }),
    );
    let base = spawn_backend(app).await;
    let mut ctx = AuthContext::new(identity(&base), LocalStore::new(temp_dir()), Duration::from_secs(5)).unwrap();

    let out = ctx.sign_up("new@b.c", "secret1", "secret1").await.unwrap();
    assert_eq!(
      out,
      SignUpOutcome::ConfirmationPending(Some(AuthUser { id: "user-2".into(), email: Some("new@b.c".into()) }))
    );
    assert!(ctx.user().is_none());
  }

  #[tokio::test]
  async fn unconfigured_identity_is_reported() {
    let mut ctx = AuthContext::new(IdentityConfig::default(), LocalStore::new(temp_dir()), Duration::from_secs(1)).unwrap();
    assert!(matches!(ctx.sign_in("a@b.c", "secret1").await, Err(AuthError::NotConfigured)));
  }
}
