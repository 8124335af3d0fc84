use std::sync::Arc;

use crate::config::Config;
use crate::firebase::{IdentityProvider, RecordStore, UserDirectory};
use crate::session::SessionStore;
use crate::sorting::flag::SortingFlagStore;
use crate::sorting::registry::DeviceRegistry;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub identity: Arc<dyn IdentityProvider>,
    pub users: Arc<dyn UserDirectory>,
    pub records: Arc<dyn RecordStore>,
    pub sessions: SessionStore,
    /// Selected variety and camera address; reset on restart.
    pub registry: DeviceRegistry,
    /// File-backed, survives restarts.
    pub sorting_flag: SortingFlagStore,
}
