//! Server-side sessions keyed by a random id carried in the `mangolens_session` cookie.
//!
//! Sessions live in process memory and are dropped on restart. A session is only
//! allocated the first time a request writes to it, so anonymous page views and
//! device polling never grow the store. An anonymous session is dropped as soon as
//! its flashes are shown, and any session idle for [`SESSION_IDLE_TTL`] is evicted
//! the next time a new one is allocated.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

use crate::models::user::Role;
use crate::state::AppState;

pub mod guards;

pub const SESSION_COOKIE: &str = "mangolens_session";
pub const SESSION_IDLE_TTL: Duration = Duration::from_secs(12 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashCategory {
    Success,
    Danger,
}

impl FlashCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlashCategory::Success => "success",
            FlashCategory::Danger => "danger",
        }
    }
}

/// A one-shot notice shown on the next rendered page.
#[derive(Debug, Clone, PartialEq)]
pub struct Flash {
    pub category: FlashCategory,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct SessionData {
    pub user_uid: Option<String>,
    pub id_token: Option<String>,
    pub user_role: Option<Role>,
    pub flashes: Vec<Flash>,
}

impl SessionData {
    fn is_anonymous(&self) -> bool {
        self.user_uid.is_none() && self.flashes.is_empty()
    }
}

struct StoredSession {
    data: SessionData,
    last_seen: Instant,
}

#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<Uuid, StoredSession>>>,
}

impl SessionStore {
    /// Refreshes the idle clock of a live session. Returns false when the id is
    /// unknown or has gone idle.
    async fn touch(&self, id: Uuid) -> bool {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(&id) {
            Some(stored) if stored.last_seen.elapsed() < SESSION_IDLE_TTL => {
                stored.last_seen = Instant::now();
                true
            }
            Some(_) => {
                sessions.remove(&id);
                false
            }
            None => false,
        }
    }

    async fn get(&self, id: Uuid) -> Option<SessionData> {
        self.sessions.read().await.get(&id).map(|s| s.data.clone())
    }

    async fn update<F>(&self, id: Uuid, f: F)
    where
        F: FnOnce(&mut SessionData),
    {
        let mut sessions = self.sessions.write().await;
        let now = Instant::now();
        if !sessions.contains_key(&id) {
            let before = sessions.len();
            sessions.retain(|_, s| now.duration_since(s.last_seen) < SESSION_IDLE_TTL);
            if sessions.len() < before {
                debug!("Evicted {} idle sessions", before - sessions.len());
            }
        }
        let stored = sessions.entry(id).or_insert_with(|| StoredSession {
            data: SessionData::default(),
            last_seen: now,
        });
        stored.last_seen = now;
        f(&mut stored.data);
    }

    /// Drains the flashes of `id`. An anonymous session left empty is removed, and
    /// the return flag reports that.
    async fn drain_flashes(&self, id: Uuid) -> (Vec<Flash>, bool) {
        let mut sessions = self.sessions.write().await;
        let Some(stored) = sessions.get_mut(&id) else {
            return (Vec::new(), true);
        };
        let flashes = std::mem::take(&mut stored.data.flashes);
        let dropped = stored.data.is_anonymous();
        if dropped {
            sessions.remove(&id);
        }
        (flashes, dropped)
    }

    async fn remove(&self, id: Uuid) {
        self.sessions.write().await.remove(&id);
    }

    #[cfg(test)]
    pub async fn contains(&self, id: Uuid) -> bool {
        self.sessions.read().await.contains_key(&id)
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

/// The current request's session. Inserted into request extensions by
/// [`session_middleware`].
#[derive(Clone)]
pub struct Session {
    store: SessionStore,
    id: Arc<Mutex<Option<Uuid>>>,
}

impl Session {
    fn new(store: SessionStore, id: Option<Uuid>) -> Self {
        Self {
            store,
            id: Arc::new(Mutex::new(id)),
        }
    }

    async fn current_id(&self) -> Option<Uuid> {
        *self.id.lock().await
    }

    /// Snapshot of the session; empty when none has been allocated.
    pub async fn get(&self) -> SessionData {
        match self.current_id().await {
            Some(id) => self.store.get(id).await.unwrap_or_default(),
            None => SessionData::default(),
        }
    }

    pub async fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut SessionData),
    {
        let id = {
            let mut id = self.id.lock().await;
            *id.get_or_insert_with(Uuid::new_v4)
        };
        self.store.update(id, f).await;
    }

    pub async fn flash(&self, category: FlashCategory, message: impl Into<String>) {
        let flash = Flash {
            category,
            message: message.into(),
        };
        self.update(|data| data.flashes.push(flash)).await;
    }

    pub async fn take_flashes(&self) -> Vec<Flash> {
        let mut id = self.id.lock().await;
        let Some(current) = *id else {
            return Vec::new();
        };
        let (flashes, dropped) = self.store.drain_flashes(current).await;
        if dropped {
            *id = None;
        }
        flashes
    }

    /// Records the verified identity under a new session id.
    pub async fn login(&self, uid: String, id_token: String, role: Role) {
        self.clear().await;
        self.update(|data| {
            data.user_uid = Some(uid);
            data.id_token = Some(id_token);
            data.user_role = Some(role);
        })
        .await;
    }

    /// Drops all session state. A later write allocates a fresh session id.
    pub async fn clear(&self) {
        let mut id = self.id.lock().await;
        if let Some(old) = id.take() {
            self.store.remove(old).await;
        }
    }
}

/// Loads the session named by the request cookie and issues a new cookie when the
/// handler allocated a fresh session.
pub async fn session_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let cookie_id =
        cookie_value(req.headers(), SESSION_COOKIE).and_then(|raw| Uuid::parse_str(raw).ok());
    let incoming = match cookie_id {
        Some(id) if state.sessions.touch(id).await => Some(id),
        _ => None,
    };

    let session = Session::new(state.sessions.clone(), incoming);
    req.extensions_mut().insert(session.clone());

    let mut response = next.run(req).await;

    if let Some(id) = session.current_id().await {
        if Some(id) != incoming {
            let cookie = format!("{SESSION_COOKIE}={id}; Path=/; HttpOnly; SameSite=Lax");
            if let Ok(value) = HeaderValue::from_str(&cookie) {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
        }
    }
    response
}

fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}
