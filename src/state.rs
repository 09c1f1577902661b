//! Application state: loaded config, local storage, auth context and the backend client.
//!
//! Built once in `main` and handed to the command handlers.

use std::time::Duration;

use tracing::{info, instrument};

use crate::api::ApiClient;
use crate::auth::AuthContext;
use crate::config::AppConfig;
use crate::error::AuthError;
use crate::storage::LocalStore;

pub struct AppState {
    pub config: AppConfig,
    pub store: LocalStore,
    pub auth: AuthContext,
}

impl AppState {
    /// Build state from config and restore the stored session, if any.
    #[instrument(level = "info", skip_all)]
    pub fn new(config: AppConfig) -> Result<Self, AuthError> {
        let store = LocalStore::new(config.resolved_data_dir());
        let timeout = Duration::from_secs(config.request_timeout_secs);
        let auth = AuthContext::new(config.identity.clone(), store.clone(), timeout)?;
        info!(
            target: "lingodeck",
            api = %config.api_base_url,
            data_dir = %store.dir().display(),
            signed_in = auth.user().is_some(),
            "Client state ready"
        );
        Ok(Self { config, store, auth })
    }

    /// Backend client carrying the current access token (if signed in).
    pub fn api(&self) -> Result<ApiClient, AuthError> {
        let client = ApiClient::from_config(&self.config)?;
        Ok(client.with_token(self.auth.access_token().map(str::to_string)))
    }

    /// Signed-in user id, or the "must be logged in to …" error.
    pub fn user_id(&self, action: &'static str) -> Result<String, AuthError> {
        Ok(self.auth.require_user(action)?.id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::temp_dir;

    #[test]
    fn fresh_state_is_signed_out() {
        let config = AppConfig { data_dir: Some(temp_dir()), ..Default::default() };
        let state = AppState::new(config).unwrap();
        assert!(state.auth.user().is_none());
        assert_eq!(
            state.user_id("view your decks").unwrap_err().to_string(),
            "You must be logged in to view your decks"
        );
        assert_eq!(state.api().unwrap().base_url, crate::config::DEFAULT_API_BASE_URL);
    }
}
