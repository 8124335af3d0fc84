pub mod health;

use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};

use crate::pages::handlers as pages;
use crate::session::{guards, session_middleware};
use crate::sorting::handlers as sorting;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    // Owner-only provisioning
    let owner = Router::new()
        .route(
            "/account",
            get(pages::account_page).post(pages::account_submit),
        )
        .route_layer(from_fn_with_state(state.clone(), guards::require_owner));

    // Any logged-in operator
    let operator = Router::new()
        .route("/logout", get(pages::logout))
        .route("/record", get(pages::record_page))
        .route("/sorting", get(pages::sorting_page))
        .route_layer(from_fn(guards::require_login));

    let browser = Router::new()
        .route("/", get(pages::index))
        .route("/login", get(pages::login_page).post(pages::login_submit))
        .route("/history", get(pages::history_page))
        .merge(operator)
        .merge(owner)
        .layer(from_fn_with_state(state.clone(), session_middleware));

    // Device API: no session, no gate
    let device = Router::new()
        .route("/api/sorting-data", post(sorting::receive_sorting_data))
        .route(
            "/api/get-latest-sorting-data",
            get(sorting::get_latest_sorting_data),
        )
        .route("/api/set-camera-ip", post(sorting::set_camera_ip))
        .route("/api/get-camera-ip", get(sorting::get_camera_ip))
        .route("/api/set-variety", post(sorting::set_variety))
        .route("/api/get-variety", get(sorting::get_variety))
        .route(
            "/api/sorting-control",
            get(sorting::get_sorting_control).post(sorting::set_sorting_control),
        );

    Router::new()
        .route("/health", get(health::health_handler))
        .merge(browser)
        .merge(device)
        .with_state(state)
}
