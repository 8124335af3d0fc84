//! Axum route handlers for the operator dashboard pages and the login exchange.

use axum::{
    body::Bytes,
    extract::{rejection::FormRejection, State},
    response::{Html, Response},
    Extension, Form, Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::body::json_object;
use crate::errors::AppError;
use crate::firebase::FirebaseError;
use crate::models::user::{Role, UserProfile};
use crate::pages::{
    render, ACCOUNT_HTML, HISTORY_HTML, INDEX_HTML, LOGIN_HTML, RECORD_HTML, SORTING_HTML,
};
use crate::session::guards::{redirect_with_flash, AuthContext};
use crate::session::{FlashCategory, Session};
use crate::state::AppState;

const MIN_PASSWORD_LEN: usize = 6;

async fn render_page(session: &Session, template: &str, vars: &[(&str, &str)]) -> Html<String> {
    let flashes = session.take_flashes().await;
    Html(render(template, &flashes, vars))
}

/// Role for display on operator pages. Falls back to the role captured at login,
/// then facilitator, when the directory cannot be read.
async fn display_role(state: &AppState, session: &Session, uid: &str) -> Role {
    match state.users.get_user(uid).await {
        Ok(Some(profile)) => profile.role,
        Ok(None) => Role::Facilitator,
        Err(e) => {
            warn!("Role lookup for {uid} failed: {e}");
            session.get().await.user_role.unwrap_or(Role::Facilitator)
        }
    }
}

/// GET /
pub async fn index(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Html<String> {
    let role = match session.get().await.user_uid {
        Some(uid) => match state.users.get_user(&uid).await {
            Ok(profile) => profile.map(|p| p.role),
            Err(e) => {
                warn!("Role lookup for {uid} failed: {e}");
                None
            }
        },
        None => None,
    };

    let status = match role {
        Some(role) => format!("Signed in as {role}"),
        None => "Not signed in".to_string(),
    };
    let role = role.map(|r| r.as_str()).unwrap_or_default();
    render_page(&session, INDEX_HTML, &[("user_role", role), ("status", status.as_str())]).await
}

/// GET /login
pub async fn login_page(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Html<String> {
    let config = &state.config;
    render_page(
        &session,
        LOGIN_HTML,
        &[
            ("api_key", config.web_api_key.as_str()),
            ("auth_domain", config.auth_domain.as_str()),
            ("project_id", config.credentials.project_id.as_str()),
        ],
    )
    .await
}

/// POST /login
///
/// Exchanges a client-minted ID token for a server-side session. First-time
/// subjects get a facilitator profile.
pub async fn login_submit(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let id_token = json_object(&body)
        .ok()
        .and_then(|payload| payload.get("idToken").and_then(Value::as_str).map(str::to_string))
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AppError::Validation("No ID token provided".to_string()))?;

    let identity = state
        .identity
        .verify_id_token(&id_token)
        .await
        .map_err(|e| match e {
            FirebaseError::InvalidToken(_) | FirebaseError::Jwt(_) => {
                AppError::Unauthorized(e.to_string())
            }
            other => AppError::Storage(format!("Login failed: {other}")),
        })?;

    let login_failed = |e: FirebaseError| AppError::Storage(format!("Login failed: {e}"));
    let role = match state.users.get_user(&identity.uid).await.map_err(login_failed)? {
        Some(profile) => profile.role,
        None => {
            let profile = UserProfile::default_facilitator(identity.email.unwrap_or_default());
            state
                .users
                .put_user(&identity.uid, &profile)
                .await
                .map_err(login_failed)?;
            info!("Created facilitator profile for {}", identity.uid);
            profile.role
        }
    };

    info!("User {} logged in as {role}", identity.uid);
    session.login(identity.uid, id_token, role).await;
    Ok(Json(json!({ "success": true })))
}

/// GET /logout
pub async fn logout(Extension(session): Extension<Session>) -> Response {
    session.clear().await;
    redirect_with_flash(&session, FlashCategory::Success, "Logged out successfully", "/login").await
}

/// GET /record
pub async fn record_page(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Extension(auth): Extension<AuthContext>,
) -> Html<String> {
    let role = display_role(&state, &session, &auth.uid).await;
    render_page(&session, RECORD_HTML, &[("user_role", role.as_str())]).await
}

/// GET /sorting
pub async fn sorting_page(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Extension(auth): Extension<AuthContext>,
) -> Html<String> {
    let role = display_role(&state, &session, &auth.uid).await;
    render_page(&session, SORTING_HTML, &[("user_role", role.as_str())]).await
}

/// GET /history
pub async fn history_page(Extension(session): Extension<Session>) -> Html<String> {
    render_page(&session, HISTORY_HTML, &[]).await
}

#[derive(Debug, Deserialize)]
pub struct AccountForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub role: String,
}

impl AccountForm {
    fn validate(&self) -> Result<Role, String> {
        if self.username.trim().is_empty() || self.email.trim().is_empty() {
            return Err("Username and email are required.".to_string());
        }
        if self.password.len() < MIN_PASSWORD_LEN {
            return Err(format!(
                "Password must be at least {MIN_PASSWORD_LEN} characters."
            ));
        }
        self.role
            .parse::<Role>()
            .map_err(|_| "Role must be owner or facilitator.".to_string())
    }
}

async fn require_verified_token(session: &Session) -> Result<(), Response> {
    if session.get().await.id_token.is_none() {
        return Err(redirect_with_flash(
            session,
            FlashCategory::Danger,
            "You must be logged in to create accounts.",
            "/login",
        )
        .await);
    }
    Ok(())
}

/// GET /account
pub async fn account_page(Extension(session): Extension<Session>) -> Result<Html<String>, Response> {
    require_verified_token(&session).await?;
    Ok(render_page(&session, ACCOUNT_HTML, &[]).await)
}

/// POST /account
pub async fn account_submit(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Extension(auth): Extension<AuthContext>,
    form: Result<Form<AccountForm>, FormRejection>,
) -> Response {
    if let Err(redirect) = require_verified_token(&session).await {
        return redirect;
    }
    let Form(form) = match form {
        Ok(form) => form,
        Err(rejection) => {
            debug!("Rejected account form: {rejection}");
            return redirect_with_flash(
                &session,
                FlashCategory::Danger,
                "Invalid account form submission.",
                "/account",
            )
            .await;
        }
    };

    let role = match form.validate() {
        Ok(role) => role,
        Err(message) => {
            return redirect_with_flash(&session, FlashCategory::Danger, message, "/account").await
        }
    };

    let email = form.email.trim();
    let created = async {
        let uid = state.identity.create_user(email, &form.password).await?;
        let profile = UserProfile {
            email: email.to_string(),
            username: form.username.trim().to_string(),
            role,
            created_at: Some(Utc::now()),
        };
        state.users.put_user(&uid, &profile).await?;
        Ok::<_, FirebaseError>(uid)
    }
    .await;

    match created {
        Ok(uid) => {
            info!("Owner {} provisioned {role} account {uid}", auth.uid);
            redirect_with_flash(
                &session,
                FlashCategory::Success,
                "Account created successfully!",
                "/login",
            )
            .await
        }
        Err(e) => {
            warn!("Account creation by {} failed: {e}", auth.uid);
            redirect_with_flash(
                &session,
                FlashCategory::Danger,
                format!("Error creating account: {e}"),
                "/account",
            )
            .await
        }
    }
}
