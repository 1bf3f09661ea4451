//! Auth client and credential storage seam
//!
//! The bearer-token contract is taken as given: `login` exchanges credentials
//! for a token, and everything else attaches it. Token persistence goes
//! through the `CredentialStore` trait so business logic never touches a
//! storage backend directly.

use parking_lot::Mutex;
use reqwest::Client;
use tracing::{debug, instrument};

use papertrade_core::{ClientError, ClientResult};

use crate::client::ClientConfig;
use crate::types::{RegisterRequest, TokenResponse, UserProfile};

/// Persisted-credential storage interface
///
/// Injected into the composition root; implementations may be backed by a
/// keychain, a file, or memory. Never read or written from state-transition
/// code.
pub trait CredentialStore: Send + Sync {
    /// Load the stored token, if any
    fn load(&self) -> Option<String>;
    /// Replace the stored token
    fn store(&self, token: &str);
    /// Remove the stored token
    fn clear(&self);
}

/// In-memory credential store, used in tests and ephemeral sessions
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    token: Mutex<Option<String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Option<String> {
        self.token.lock().clone()
    }

    fn store(&self, token: &str) {
        *self.token.lock() = Some(token.to_string());
    }

    fn clear(&self) {
        *self.token.lock() = None;
    }
}

/// Papertrade auth API client
#[derive(Clone)]
pub struct AuthClient {
    client: Client,
    base_url: String,
}

impl AuthClient {
    pub fn new(config: ClientConfig) -> Self {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url: config.base_url,
        }
    }

    /// Exchange username/password for a bearer token
    ///
    /// The login endpoint takes form-encoded credentials.
    #[instrument(skip(self, password))]
    pub async fn login(&self, username: &str, password: &str) -> ClientResult<TokenResponse> {
        let url = format!("{}/auth/login", self.base_url);

        debug!("Logging in as: {}", username);

        let response = self
            .client
            .post(&url)
            .form(&[("username", username), ("password", password)])
            .send()
            .await
            .map_err(|e| ClientError::network(format!("Login request failed: {}", e)))?;

        if response.status().as_u16() == 401 {
            return Err(ClientError::auth("Invalid username or password"));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::api(format!(
                "Login failed ({}): {}",
                status, body
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| ClientError::parse(format!("Failed to parse token response: {}", e)))?;

        Ok(token)
    }

    /// Register a new account
    #[instrument(skip(self, request), fields(username = %request.username))]
    pub async fn register(&self, request: &RegisterRequest) -> ClientResult<UserProfile> {
        let url = format!("{}/auth/register", self.base_url);

        debug!("Registering account: {}", request.username);

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| ClientError::network(format!("Register request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::api(format!(
                "Registration failed ({}): {}",
                status, body
            )));
        }

        let profile: UserProfile = response
            .json()
            .await
            .map_err(|e| ClientError::parse(format!("Failed to parse profile: {}", e)))?;

        Ok(profile)
    }

    /// Fetch the profile for a bearer token
    #[instrument(skip(self, token))]
    pub async fn me(&self, token: &str) -> ClientResult<UserProfile> {
        let url = format!("{}/auth/me", self.base_url);

        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| ClientError::network(format!("Profile request failed: {}", e)))?;

        if response.status().as_u16() == 401 {
            return Err(ClientError::auth("Invalid or expired session token"));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::api(format!(
                "Profile fetch failed ({}): {}",
                status, body
            )));
        }

        let profile: UserProfile = response
            .json()
            .await
            .map_err(|e| ClientError::parse(format!("Failed to parse profile: {}", e)))?;

        Ok(profile)
    }
}

impl std::fmt::Debug for AuthClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemoryCredentialStore::new();
        assert!(store.load().is_none());

        store.store("token-123");
        assert_eq!(store.load().as_deref(), Some("token-123"));

        store.clear();
        assert!(store.load().is_none());
    }
}
