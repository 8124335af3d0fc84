use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::firebase::credentials::ServiceAccountKey;

const DEFAULT_DATABASE_URL: &str = "https://mango-lens-1fff8-default-rtdb.firebaseio.com";
const DEFAULT_CREDENTIALS_FILE: &str = "serviceAccountKey.json";
const DEFAULT_STATE_PATH: &str = "sorting_state.json";

/// Application configuration loaded from environment variables.
/// Fails at startup if the Firebase service account cannot be loaded.
#[derive(Debug, Clone)]
pub struct Config {
    pub credentials: ServiceAccountKey,
    pub database_url: String,
    pub web_api_key: String,
    pub auth_domain: String,
    pub sorting_state_path: PathBuf,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let credentials = load_credentials()?;
        let auth_domain = std::env::var("FIREBASE_AUTH_DOMAIN")
            .unwrap_or_else(|_| format!("{}.firebaseapp.com", credentials.project_id));

        Ok(Config {
            credentials,
            database_url: std::env::var("FIREBASE_DATABASE_URL")
                .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            web_api_key: std::env::var("FIREBASE_WEB_API_KEY").unwrap_or_default(),
            auth_domain,
            sorting_state_path: std::env::var("SORTING_STATE_PATH")
                .unwrap_or_else(|_| DEFAULT_STATE_PATH.to_string())
                .into(),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

/// The inline `FIREBASE_CREDENTIALS` blob wins; otherwise the key file is read from disk.
fn load_credentials() -> Result<ServiceAccountKey> {
    if let Ok(blob) = std::env::var("FIREBASE_CREDENTIALS") {
        return ServiceAccountKey::from_json(&blob)
            .context("FIREBASE_CREDENTIALS is not a valid service account JSON document");
    }

    let path = std::env::var("FIREBASE_CREDENTIALS_FILE")
        .unwrap_or_else(|_| DEFAULT_CREDENTIALS_FILE.to_string());
    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read service account file '{path}'"))?;
    ServiceAccountKey::from_json(&raw)
        .with_context(|| format!("Service account file '{path}' is not valid"))
}

#[cfg(test)]
impl Config {
    pub fn for_tests(sorting_state_path: PathBuf) -> Self {
        let credentials = ServiceAccountKey::from_json(
            r#"{"project_id":"mango-lens-test","client_email":"svc@mango-lens-test.iam.gserviceaccount.com","private_key":"unused"}"#,
        )
        .expect("test credentials");
        Config {
            credentials,
            database_url: "https://mango-lens-test.firebaseio.com".to_string(),
            web_api_key: "test-web-key".to_string(),
            auth_domain: "mango-lens-test.firebaseapp.com".to_string(),
            sorting_state_path,
            port: 0,
            rust_log: "debug".to_string(),
        }
    }
}
