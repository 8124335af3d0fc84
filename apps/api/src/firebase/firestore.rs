use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::warn;

use super::{check_status, FirebaseError, GoogleTokenSource};
use crate::models::user::{Role, UserProfile};

const FIRESTORE_API: &str = "https://firestore.googleapis.com/v1";
const USERS_COLLECTION: &str = "users";

/// User profile lookups keyed by the identity provider's uid.
///
/// Carried in `AppState` as `Arc<dyn UserDirectory>`.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get_user(&self, uid: &str) -> Result<Option<UserProfile>, FirebaseError>;

    /// Writes the whole profile document, replacing any existing one.
    async fn put_user(&self, uid: &str, profile: &UserProfile) -> Result<(), FirebaseError>;
}

#[derive(Debug, Deserialize)]
struct Document {
    #[serde(default)]
    fields: Map<String, Value>,
}

/// Firestore REST client for the `users` collection.
pub struct FirestoreUsers {
    client: Client,
    tokens: GoogleTokenSource,
    documents_url: String,
}

impl FirestoreUsers {
    pub fn new(client: Client, tokens: GoogleTokenSource, project_id: &str) -> Self {
        Self {
            client,
            tokens,
            documents_url: format!(
                "{FIRESTORE_API}/projects/{project_id}/databases/(default)/documents"
            ),
        }
    }

    fn user_url(&self, uid: &str) -> String {
        format!("{}/{USERS_COLLECTION}/{uid}", self.documents_url)
    }
}

#[async_trait]
impl UserDirectory for FirestoreUsers {
    async fn get_user(&self, uid: &str) -> Result<Option<UserProfile>, FirebaseError> {
        let token = self.tokens.access_token().await?;
        let response = self
            .client
            .get(self.user_url(uid))
            .bearer_auth(token)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let document: Document = check_status(response).await?.json().await?;
        Ok(Some(decode_profile(uid, &document.fields)))
    }

    async fn put_user(&self, uid: &str, profile: &UserProfile) -> Result<(), FirebaseError> {
        let token = self.tokens.access_token().await?;
        let response = self
            .client
            .patch(self.user_url(uid))
            .bearer_auth(token)
            .json(&json!({ "fields": encode_profile(profile) }))
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }
}

fn string_field<'a>(fields: &'a Map<String, Value>, name: &str) -> Option<&'a str> {
    fields.get(name)?.get("stringValue")?.as_str()
}

/// Decodes a Firestore document into a profile. A missing or unknown role reads as
/// facilitator so that a malformed document can never grant owner rights.
fn decode_profile(uid: &str, fields: &Map<String, Value>) -> UserProfile {
    let role = match string_field(fields, "role") {
        Some(raw) => raw.parse::<Role>().unwrap_or_else(|e| {
            warn!("User {uid}: {e}, treating as facilitator");
            Role::Facilitator
        }),
        None => Role::Facilitator,
    };
    let created_at = fields
        .get("created_at")
        .and_then(|v| v.get("timestampValue"))
        .and_then(Value::as_str)
        .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
        .map(|ts| ts.with_timezone(&Utc));

    UserProfile {
        email: string_field(fields, "email").unwrap_or_default().to_string(),
        username: string_field(fields, "username").unwrap_or_default().to_string(),
        role,
        created_at,
    }
}

fn encode_profile(profile: &UserProfile) -> Value {
    let created_at = profile
        .created_at
        .unwrap_or_else(Utc::now)
        .to_rfc3339_opts(SecondsFormat::Micros, true);
    json!({
        "email": { "stringValue": profile.email },
        "username": { "stringValue": profile.username },
        "role": { "stringValue": profile.role.as_str() },
        "created_at": { "timestampValue": created_at },
    })
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::{
        extract::{Path, State},
        http::{HeaderMap, StatusCode as HttpStatus},
        response::{IntoResponse, Response},
        routing::get,
        Json, Router,
    };
    use chrono::TimeZone;

    use super::*;
    use crate::firebase::memory::{bearer, fake_google, TEST_ACCESS_TOKEN};

    type Written = Arc<Mutex<Vec<(String, Value)>>>;

    async fn get_doc(Path(uid): Path<String>, headers: HeaderMap) -> Response {
        assert_eq!(bearer(&headers), Some(TEST_ACCESS_TOKEN));
        match uid.as_str() {
            "owner-uid" => Json(json!({
                "name": "projects/p/databases/(default)/documents/users/owner-uid",
                "fields": {
                    "email": { "stringValue": "owner@mango.ph" },
                    "username": { "stringValue": "Boss" },
                    "role": { "stringValue": "owner" }
                }
            }))
            .into_response(),
            "locked-uid" => (
                HttpStatus::FORBIDDEN,
                Json(json!({ "error": { "code": 403, "message": "Missing or insufficient permissions." } })),
            )
                .into_response(),
            _ => (
                HttpStatus::NOT_FOUND,
                Json(json!({ "error": { "code": 404, "message": "Document not found", "status": "NOT_FOUND" } })),
            )
                .into_response(),
        }
    }

    async fn patch_doc(
        State(written): State<Written>,
        Path(uid): Path<String>,
        Json(body): Json<Value>,
    ) -> Json<Value> {
        written.lock().unwrap().push((uid, body.clone()));
        Json(body)
    }

    async fn directory() -> (FirestoreUsers, Written) {
        let written = Written::default();
        let routes = Router::new()
            .route("/documents/users/:uid", get(get_doc).patch(patch_doc))
            .with_state(written.clone());
        let (base, client, tokens) = fake_google(routes).await;
        let mut users = FirestoreUsers::new(client, tokens, "unused");
        users.documents_url = format!("{base}/documents");
        (users, written)
    }

    #[tokio::test]
    async fn test_get_user_decodes_document() {
        let (users, _) = directory().await;
        let profile = users.get_user("owner-uid").await.unwrap().unwrap();
        assert_eq!(profile.role, Role::Owner);
        assert_eq!(profile.email, "owner@mango.ph");
    }

    #[tokio::test]
    async fn test_get_user_missing_document_is_none() {
        let (users, _) = directory().await;
        assert!(users.get_user("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_user_permission_error_is_not_none() {
        let (users, _) = directory().await;
        match users.get_user("locked-uid").await.unwrap_err() {
            FirebaseError::Api { status, message } => {
                assert_eq!(status, 403);
                assert_eq!(message, "Missing or insufficient permissions.");
            }
            other => panic!("expected API error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_put_user_patches_typed_fields() {
        let (users, written) = directory().await;
        let profile = UserProfile::default_facilitator("new@mango.ph".to_string());
        users.put_user("new-uid", &profile).await.unwrap();

        let written = written.lock().unwrap();
        let (uid, body) = &written[0];
        assert_eq!(uid, "new-uid");
        assert_eq!(body["fields"]["role"]["stringValue"], "facilitator");
        assert_eq!(body["fields"]["email"]["stringValue"], "new@mango.ph");
        assert!(body["fields"]["created_at"]["timestampValue"].is_string());
    }

    fn fields(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_decode_owner_profile() {
        let doc = fields(json!({
            "email": { "stringValue": "owner@mango.ph" },
            "username": { "stringValue": "Boss" },
            "role": { "stringValue": "owner" },
            "created_at": { "timestampValue": "2025-01-15T08:30:00.123456Z" }
        }));
        let profile = decode_profile("uid-1", &doc);
        assert_eq!(profile.role, Role::Owner);
        assert_eq!(profile.username, "Boss");
        assert_eq!(
            profile.created_at.unwrap().date_naive(),
            chrono::NaiveDate::from_ymd_opt(2025, 1, 15).unwrap()
        );
    }

    #[test]
    fn test_decode_missing_role_defaults_to_facilitator() {
        let doc = fields(json!({ "email": { "stringValue": "x@y.z" } }));
        let profile = decode_profile("uid-2", &doc);
        assert_eq!(profile.role, Role::Facilitator);
        assert_eq!(profile.username, "");
        assert!(profile.created_at.is_none());
    }

    #[test]
    fn test_decode_unknown_role_never_escalates() {
        let doc = fields(json!({ "role": { "stringValue": "superadmin" } }));
        assert_eq!(decode_profile("uid-3", &doc).role, Role::Facilitator);
    }

    #[test]
    fn test_encode_uses_typed_values() {
        let profile = UserProfile {
            email: "f@mango.ph".to_string(),
            username: "Facilitator".to_string(),
            role: Role::Facilitator,
            created_at: Some(Utc.with_ymd_and_hms(2025, 3, 7, 10, 0, 0).unwrap()),
        };
        let encoded = encode_profile(&profile);
        assert_eq!(encoded["role"]["stringValue"], "facilitator");
        assert_eq!(
            encoded["created_at"]["timestampValue"],
            "2025-03-07T10:00:00.000000Z"
        );
        assert_eq!(decode_profile("uid", encoded.as_object().unwrap()), profile);
    }
}
