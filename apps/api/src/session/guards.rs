//! Access-control layers composed ahead of gated page routes.
//!
//! Both gates redirect with a flash notice instead of rendering an error, and both
//! insert an [`AuthContext`] for the handler on success. The owner gate re-reads the
//! role from the user directory on every request.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
    Extension,
};
use tracing::{debug, warn};

use super::{FlashCategory, Session};
use crate::models::user::Role;
use crate::state::AppState;

pub const LOGIN_REQUIRED_NOTICE: &str = "You must be logged in to access this page.";
pub const PERMISSION_NOTICE: &str = "You don't have permission to access this page.";
pub const PROFILE_MISSING_NOTICE: &str = "User data not found.";

/// Identity of the caller, available to handlers behind a gate.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub uid: String,
}

pub async fn redirect_with_flash(
    session: &Session,
    category: FlashCategory,
    message: impl Into<String>,
    to: &str,
) -> Response {
    session.flash(category, message).await;
    Redirect::to(to).into_response()
}

pub async fn require_login(
    Extension(session): Extension<Session>,
    mut req: Request,
    next: Next,
) -> Response {
    let Some(uid) = session.get().await.user_uid else {
        debug!("Login required for {}", req.uri().path());
        return redirect_with_flash(&session, FlashCategory::Danger, LOGIN_REQUIRED_NOTICE, "/login")
            .await;
    };

    req.extensions_mut().insert(AuthContext { uid });
    next.run(req).await
}

/// Fails closed: a directory error is handled exactly like a non-owner role.
pub async fn require_owner(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    mut req: Request,
    next: Next,
) -> Response {
    let Some(uid) = session.get().await.user_uid else {
        return redirect_with_flash(&session, FlashCategory::Danger, LOGIN_REQUIRED_NOTICE, "/login")
            .await;
    };

    match state.users.get_user(&uid).await {
        Ok(Some(profile)) if profile.role == Role::Owner => {
            req.extensions_mut().insert(AuthContext { uid });
            next.run(req).await
        }
        Ok(Some(profile)) => {
            debug!("User {uid} with role {} denied owner route", profile.role);
            redirect_with_flash(&session, FlashCategory::Danger, PERMISSION_NOTICE, "/").await
        }
        Ok(None) => {
            redirect_with_flash(&session, FlashCategory::Danger, PROFILE_MISSING_NOTICE, "/login")
                .await
        }
        Err(e) => {
            warn!("Role lookup for {uid} failed, denying owner route: {e}");
            redirect_with_flash(&session, FlashCategory::Danger, PERMISSION_NOTICE, "/").await
        }
    }
}
