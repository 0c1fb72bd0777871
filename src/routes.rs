// routes.rs
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use http::{header, Method, StatusCode};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;

use crate::state::AppState;
use crate::{auth, proposals, public_poll};

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .route("/auth/google", post(auth::google_login))
        .route("/proposals", get(proposals::list).post(proposals::create))
        .route("/proposals/{id}", get(proposals::get))
        .route("/proposals/{id}/close", post(proposals::close))
        .route("/proposals/{id}/votes", get(proposals::votes))
        .route("/public/polls/{token}", get(public_poll::get_poll))
        .route("/public/polls/{token}/votes", post(public_poll::submit_votes))
        .route("/health/db", get(health_db))
        .layer(cors)
        .with_state(state)
}

async fn health_db(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.ping().await {
        Ok(()) => (StatusCode::OK, Json(json!({ "dbStatus": "ok" }))),
        Err(err) => {
            warn!(error = %err, "database health check failed");
            (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "dbStatus": "down" })))
        }
    }
}
