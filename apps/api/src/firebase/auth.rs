use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{jwk::JwkSet, Algorithm, DecodingKey, Validation};
use reqwest::{header::CACHE_CONTROL, Client};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{check_status, FirebaseError, GoogleTokenSource};

const SECURETOKEN_JWKS_URL: &str =
    "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";
const IDENTITY_TOOLKIT_API: &str = "https://identitytoolkit.googleapis.com/v1";
/// Used when Google omits `Cache-Control: max-age` on the key set.
const DEFAULT_JWKS_TTL_SECS: i64 = 3600;
/// An unknown `kid` refetches a still-fresh key set at most this often.
const JWKS_MIN_REFETCH_SECS: i64 = 60;

/// The stable subject extracted from a verified ID token.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedIdentity {
    pub uid: String,
    pub email: Option<String>,
}

/// Identity verification and account creation.
///
/// Carried in `AppState` as `Arc<dyn IdentityProvider>`.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Verifies an ID token minted by the client-side SDK.
    async fn verify_id_token(&self, id_token: &str) -> Result<VerifiedIdentity, FirebaseError>;

    /// Creates an email/password account and returns its uid.
    async fn create_user(&self, email: &str, password: &str) -> Result<String, FirebaseError>;
}

#[derive(Debug, Deserialize)]
struct IdTokenClaims {
    sub: String,
    email: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreateAccountRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateAccountResponse {
    local_id: String,
}

struct CachedJwks {
    keys: JwkSet,
    fetched_at: i64,
    expires_at: i64,
}

/// Firebase Auth backed by Google's public signing keys and the Identity Toolkit admin API.
pub struct FirebaseAuth {
    client: Client,
    tokens: GoogleTokenSource,
    project_id: String,
    jwks_url: String,
    accounts_url: String,
    jwks: Mutex<Option<CachedJwks>>,
}

impl FirebaseAuth {
    pub fn new(client: Client, tokens: GoogleTokenSource, project_id: String) -> Self {
        Self {
            client,
            tokens,
            accounts_url: format!("{IDENTITY_TOOLKIT_API}/projects/{project_id}/accounts"),
            project_id,
            jwks_url: SECURETOKEN_JWKS_URL.to_string(),
            jwks: Mutex::new(None),
        }
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[self.project_id.as_str()]);
        validation.set_issuer(&[format!("https://securetoken.google.com/{}", self.project_id)]);
        validation.set_required_spec_claims(&["exp", "sub", "aud", "iss"]);
        validation
    }

    /// Returns the decoding key for `kid`. The key set is refetched when it has expired,
    /// or when it does not know `kid` and was not fetched within the last
    /// [`JWKS_MIN_REFETCH_SECS`] (Google rotates roughly daily).
    async fn decoding_key(&self, kid: &str) -> Result<DecodingKey, FirebaseError> {
        let now = Utc::now().timestamp();
        if let Some(jwks) = self.jwks.lock().await.as_ref() {
            if jwks.expires_at > now {
                if let Some(jwk) = jwks.keys.find(kid) {
                    return Ok(DecodingKey::from_jwk(jwk)?);
                }
                if now - jwks.fetched_at < JWKS_MIN_REFETCH_SECS {
                    return Err(unknown_key(kid));
                }
            }
        }

        // The lock is not held across the fetch.
        let (keys, ttl) = self.fetch_jwks().await?;
        let key = keys
            .find(kid)
            .map(DecodingKey::from_jwk)
            .transpose()?
            .ok_or_else(|| unknown_key(kid));
        *self.jwks.lock().await = Some(CachedJwks {
            keys,
            fetched_at: now,
            expires_at: now + ttl,
        });
        key
    }

    async fn fetch_jwks(&self) -> Result<(JwkSet, i64), FirebaseError> {
        let response = self.client.get(&self.jwks_url).send().await?;
        let response = check_status(response).await?;
        let ttl = response
            .headers()
            .get(CACHE_CONTROL)
            .and_then(|v| v.to_str().ok())
            .and_then(max_age_secs)
            .unwrap_or(DEFAULT_JWKS_TTL_SECS);
        let keys: JwkSet = response.json().await?;
        debug!("Fetched {} ID token signing keys (ttl {ttl}s)", keys.keys.len());
        Ok((keys, ttl))
    }
}

fn unknown_key(kid: &str) -> FirebaseError {
    FirebaseError::InvalidToken(format!("unknown signing key '{kid}'"))
}

#[async_trait]
impl IdentityProvider for FirebaseAuth {
    async fn verify_id_token(&self, id_token: &str) -> Result<VerifiedIdentity, FirebaseError> {
        let header = jsonwebtoken::decode_header(id_token)
            .map_err(|e| FirebaseError::InvalidToken(e.to_string()))?;
        if header.alg != Algorithm::RS256 {
            return Err(FirebaseError::InvalidToken(format!(
                "unexpected algorithm {:?}",
                header.alg
            )));
        }
        let kid = header
            .kid
            .ok_or_else(|| FirebaseError::InvalidToken("missing 'kid' header".to_string()))?;

        let key = self.decoding_key(&kid).await?;
        let data = jsonwebtoken::decode::<IdTokenClaims>(id_token, &key, &self.validation())
            .map_err(|e| FirebaseError::InvalidToken(e.to_string()))?;

        if data.claims.sub.is_empty() {
            return Err(FirebaseError::InvalidToken("empty subject".to_string()));
        }
        Ok(VerifiedIdentity {
            uid: data.claims.sub,
            email: data.claims.email,
        })
    }

    async fn create_user(&self, email: &str, password: &str) -> Result<String, FirebaseError> {
        let token = self.tokens.access_token().await?;
        let response = self
            .client
            .post(&self.accounts_url)
            .bearer_auth(token)
            .json(&CreateAccountRequest { email, password })
            .send()
            .await?;
        let created: CreateAccountResponse = check_status(response).await?.json().await?;

        info!("Created account {} for {email}", created.local_id);
        Ok(created.local_id)
    }
}

/// Extracts `max-age` from a `Cache-Control` header value.
fn max_age_secs(cache_control: &str) -> Option<i64> {
    cache_control
        .split(',')
        .map(str::trim)
        .find_map(|directive| directive.strip_prefix("max-age="))
        .and_then(|v| v.parse().ok())
}
