//! In-memory stand-ins for the Firebase traits, used by handler and router tests,
//! and a local HTTP stand-in for Google used by the REST adapter tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use axum::{routing::post, Form, Json, Router};
use reqwest::Client;
use serde_json::{json, Value};

use super::auth::VerifiedIdentity;
use super::credentials::ServiceAccountKey;
use super::{FirebaseError, GoogleTokenSource, IdentityProvider, RecordStore, UserDirectory};
use crate::models::record::SortingRecord;
use crate::models::user::UserProfile;

/// Throwaway RSA key used only by tests; its public half is `TEST_JWKS`.
pub const TEST_PRIVATE_KEY: &str = include_str!("testdata/service_account.pem");
pub const TEST_JWKS: &str = include_str!("testdata/jwks.json");
pub const TEST_KEY_ID: &str = "test-key-1";
pub const TEST_PROJECT: &str = "mango-lens-test";
pub const TEST_ACCESS_TOKEN: &str = "ya29.test-access-token";

/// Serves `router` on an ephemeral local port and returns its base URL.
pub async fn serve_local(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

async fn issue_token(Form(form): Form<HashMap<String, String>>) -> Json<Value> {
    assert_eq!(
        form.get("grant_type").map(String::as_str),
        Some("urn:ietf:params:oauth:grant-type:jwt-bearer")
    );
    assert!(form.get("assertion").is_some_and(|a| a.split('.').count() == 3));
    Json(json!({ "access_token": TEST_ACCESS_TOKEN, "expires_in": 3600, "token_type": "Bearer" }))
}

pub fn test_key(token_uri: &str) -> ServiceAccountKey {
    let mut key = ServiceAccountKey::from_json(
        &json!({
            "project_id": TEST_PROJECT,
            "client_email": format!("sorter@{TEST_PROJECT}.iam.gserviceaccount.com"),
            "private_key": TEST_PRIVATE_KEY,
        })
        .to_string(),
    )
    .unwrap();
    key.token_uri = token_uri.to_string();
    key
}

/// Serves `routes` plus a `/token` OAuth endpoint, and returns the base URL with a
/// token source pointed at it.
pub async fn fake_google(routes: Router) -> (String, Client, GoogleTokenSource) {
    let base = serve_local(routes.route("/token", post(issue_token))).await;
    let client = Client::new();
    let tokens = GoogleTokenSource::new(client.clone(), test_key(&format!("{base}/token")));
    (base, client, tokens)
}

pub fn bearer(headers: &axum::http::HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

fn unavailable() -> FirebaseError {
    FirebaseError::Api {
        status: 503,
        message: "service unavailable".to_string(),
    }
}

#[derive(Default)]
pub struct MemoryIdentity {
    /// token -> identity it verifies as
    pub tokens: Mutex<HashMap<String, VerifiedIdentity>>,
    /// (email, password) of every account created
    pub created: Mutex<Vec<(String, String)>>,
    pub fail_create: AtomicBool,
}

impl MemoryIdentity {
    pub fn with_token(self, token: &str, uid: &str, email: &str) -> Self {
        self.tokens.lock().unwrap().insert(
            token.to_string(),
            VerifiedIdentity {
                uid: uid.to_string(),
                email: Some(email.to_string()),
            },
        );
        self
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentity {
    async fn verify_id_token(&self, id_token: &str) -> Result<VerifiedIdentity, FirebaseError> {
        self.tokens
            .lock()
            .unwrap()
            .get(id_token)
            .cloned()
            .ok_or_else(|| FirebaseError::InvalidToken("unknown token".to_string()))
    }

    async fn create_user(&self, email: &str, password: &str) -> Result<String, FirebaseError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(FirebaseError::Api {
                status: 400,
                message: "EMAIL_EXISTS".to_string(),
            });
        }
        let mut created = self.created.lock().unwrap();
        created.push((email.to_string(), password.to_string()));
        Ok(format!("uid-{}", created.len()))
    }
}

#[derive(Default)]
pub struct MemoryUsers {
    pub docs: Mutex<HashMap<String, UserProfile>>,
    pub fail: AtomicBool,
}

impl MemoryUsers {
    pub fn with_user(self, uid: &str, profile: UserProfile) -> Self {
        self.docs.lock().unwrap().insert(uid.to_string(), profile);
        self
    }
}

#[async_trait]
impl UserDirectory for MemoryUsers {
    async fn get_user(&self, uid: &str) -> Result<Option<UserProfile>, FirebaseError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        Ok(self.docs.lock().unwrap().get(uid).cloned())
    }

    async fn put_user(&self, uid: &str, profile: &UserProfile) -> Result<(), FirebaseError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        self.docs
            .lock()
            .unwrap()
            .insert(uid.to_string(), profile.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryRecords {
    pub records: Mutex<Vec<SortingRecord>>,
    pub fail: AtomicBool,
}

#[async_trait]
impl RecordStore for MemoryRecords {
    async fn append(&self, record: &SortingRecord) -> Result<String, FirebaseError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        let mut records = self.records.lock().unwrap();
        records.push(record.clone());
        Ok(format!("-rec{}", records.len()))
    }

    async fn latest(&self) -> Result<Option<SortingRecord>, FirebaseError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .max_by_key(|r| r.timestamp)
            .cloned())
    }
}
