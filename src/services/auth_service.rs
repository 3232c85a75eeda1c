use std::path::{Path, PathBuf};

use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::api_client::{check, ApiError, DEFAULT_API_BASE, REQUEST_TIMEOUT};
use super::storage::{load_json, remove_json, save_json, StoreError};
use crate::models::User;

// ============================================================================
// AUTH DATA STRUCTURES
// ============================================================================

/// Persisted session credential. Token and user survive restarts until an
/// explicit logout or a 401 from the backend clears them.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthState {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub user: Option<User>,
}

/// Response from the login and register endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

#[derive(Debug, Serialize)]
struct LoginBody<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct RegisterBody<'a> {
    name: &'a str,
    email: &'a str,
    password: &'a str,
}

// ============================================================================
// AUTH STATE PERSISTENCE
// ============================================================================

#[derive(Debug)]
pub struct AuthStore {
    path: PathBuf,
}

impl AuthStore {
    pub fn open(dir: &Path) -> Self {
        Self {
            path: dir.join("auth.json"),
        }
    }

    pub fn load(&self) -> Result<AuthState, StoreError> {
        load_json(&self.path)
    }

    pub fn save(&self, state: &AuthState) -> Result<(), StoreError> {
        save_json(&self.path, state)
    }

    pub fn clear(&self) -> Result<(), StoreError> {
        remove_json(&self.path)
    }
}

// ============================================================================
// AUTH ENDPOINTS
// ============================================================================

/// Client for the auth collaborator. Unlike the chat endpoints these carry
/// no bearer header; a successful call yields the credential instead.
pub struct AuthClient {
    client: Client,
    base_url: String,
}

impl AuthClient {
    pub fn new(base_url: &str) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, ApiError> {
        let response = self
            .client
            .post(format!("{}/auth/login", self.base_url))
            .json(&LoginBody { email, password })
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    pub async fn signup(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<AuthResponse, ApiError> {
        let response = self
            .client
            .post(format!("{}/auth/register", self.base_url))
            .json(&RegisterBody {
                name,
                email,
                password,
            })
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }
}

impl Default for AuthClient {
    fn default() -> Self {
        Self::new(DEFAULT_API_BASE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_state_round_trips_and_clears() {
        let dir = tempfile::tempdir().unwrap();
        let store = AuthStore::open(dir.path());

        // nothing persisted yet
        let state = store.load().unwrap();
        assert!(state.token.is_none());

        store
            .save(&AuthState {
                token: Some("tok".to_string()),
                user: Some(User {
                    id: "u1".to_string(),
                    name: "Maya".to_string(),
                    email: "maya@example.com".to_string(),
                }),
            })
            .unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.token.as_deref(), Some("tok"));
        assert_eq!(loaded.user.unwrap().name, "Maya");

        store.clear().unwrap();
        assert!(store.load().unwrap().token.is_none());
        // clearing twice is fine
        store.clear().unwrap();
    }
}
