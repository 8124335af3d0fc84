//! Firebase adapters: the single point of entry for every Google API call in MangoLens.
//!
//! Three external collaborators sit behind traits so handlers never see HTTP:
//! - [`IdentityProvider`]: ID token verification and account creation (Firebase Auth)
//! - [`UserDirectory`]: user profiles in the Firestore `users` collection
//! - [`RecordStore`]: the append-only `records` list in the Realtime Database
//!
//! `AppState` carries each as an `Arc<dyn Trait>`. Calls are never retried.
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use reqwest::{Client, Response};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

pub mod auth;
pub mod credentials;
pub mod firestore;
#[cfg(test)]
pub mod memory;
pub mod realtime;

pub use auth::{FirebaseAuth, IdentityProvider};
pub use firestore::{FirestoreUsers, UserDirectory};
pub use realtime::{RealtimeRecords, RecordStore};

use credentials::ServiceAccountKey;

const HTTP_TIMEOUT_SECS: u64 = 30;
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
/// Refresh the cached access token this long before Google says it expires.
const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;
const SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/cloud-platform",
    "https://www.googleapis.com/auth/firebase.database",
    "https://www.googleapis.com/auth/userinfo.email",
    "https://www.googleapis.com/auth/identitytoolkit",
];

#[derive(Debug, Error)]
pub enum FirebaseError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("Invalid service account: {0}")]
    Credentials(String),

    #[error("Invalid ID token: {0}")]
    InvalidToken(String),

    #[error("Malformed document: {0}")]
    Malformed(String),
}

/// Builds the HTTP client shared by all adapters.
pub fn http_client() -> Result<Client, FirebaseError> {
    Ok(Client::builder()
        .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
        .build()?)
}

/// Turns a non-2xx response into [`FirebaseError::Api`], pulling the message out of
/// either Google's `{"error":{"message":..}}` or the Realtime Database's `{"error":".."}`.
pub(crate) async fn check_status(response: Response) -> Result<Response, FirebaseError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(FirebaseError::Api {
        status: status.as_u16(),
        message: extract_error_message(&body),
    })
}

fn extract_error_message(body: &str) -> String {
    let parsed: serde_json::Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(_) => return body.to_string(),
    };
    let error = &parsed["error"];
    error["message"]
        .as_str()
        .or_else(|| error.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| body.to_string())
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

struct CachedToken {
    token: String,
    expires_at: i64,
}

/// Mints OAuth2 access tokens for the service account and caches them until shortly
/// before expiry.
#[derive(Clone)]
pub struct GoogleTokenSource {
    client: Client,
    key: Arc<ServiceAccountKey>,
    cached: Arc<Mutex<Option<CachedToken>>>,
}

impl GoogleTokenSource {
    pub fn new(client: Client, key: ServiceAccountKey) -> Self {
        Self {
            client,
            key: Arc::new(key),
            cached: Arc::new(Mutex::new(None)),
        }
    }

    pub async fn access_token(&self) -> Result<String, FirebaseError> {
        let mut cached = self.cached.lock().await;
        let now = Utc::now().timestamp();

        if let Some(token) = cached.as_ref() {
            if token.expires_at - TOKEN_REFRESH_MARGIN_SECS > now {
                return Ok(token.token.clone());
            }
        }

        let assertion = self.key.sign_assertion(now, SCOPES)?;
        let response = self
            .client
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;
        let body: TokenResponse = check_status(response).await?.json().await?;

        debug!("Minted Google access token (expires in {}s)", body.expires_in);
        let token = body.access_token.clone();
        *cached = Some(CachedToken {
            token: body.access_token,
            expires_at: now + body.expires_in,
        });
        Ok(token)
    }
}
