mod body;
mod config;
mod errors;
mod firebase;
mod models;
mod pages;
mod routes;
mod session;
mod sorting;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::firebase::{FirebaseAuth, FirestoreUsers, GoogleTokenSource, RealtimeRecords};
use crate::routes::build_router;
use crate::session::SessionStore;
use crate::sorting::flag::SortingFlagStore;
use crate::sorting::registry::DeviceRegistry;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing service account)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={}",
                env!("CARGO_PKG_NAME").replace('-', "_"),
                &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting MangoLens API v{}", env!("CARGO_PKG_VERSION"));

    // Firebase adapters share one HTTP client and one access-token cache
    let http = firebase::http_client()?;
    let project_id = config.credentials.project_id.clone();
    let tokens = GoogleTokenSource::new(http.clone(), config.credentials.clone());
    info!(
        "Firebase project {project_id} (service account {})",
        config.credentials.client_email
    );

    let identity = Arc::new(FirebaseAuth::new(
        http.clone(),
        tokens.clone(),
        project_id.clone(),
    ));
    let users = Arc::new(FirestoreUsers::new(http.clone(), tokens.clone(), &project_id));
    let records = Arc::new(RealtimeRecords::new(http, tokens, &config.database_url));
    info!("Realtime database: {}", config.database_url);

    let sorting_flag = SortingFlagStore::new(config.sorting_state_path.clone());
    info!(
        "Sorting flag at {} (active: {})",
        sorting_flag.path().display(),
        sorting_flag.get().await
    );

    // Build app state
    let state = AppState {
        config: config.clone(),
        identity,
        users,
        records,
        sessions: SessionStore::default(),
        registry: DeviceRegistry::default(),
        sorting_flag,
    };

    // Build router
    let app = build_router(state).layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
