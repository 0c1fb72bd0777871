// src/main.rs
mod auth;
mod config;
mod db;
mod error;
mod models;
mod proposals;
mod public_poll;
mod routes;
mod state;
mod store;
mod token;

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::auth::GoogleVerifier;
use crate::config::Config;
use crate::state::AppState;
use crate::store::ProposalStore;
use crate::token::TokenCodec;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok(); // Load environment variables from .env file

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Config::load();

    // Create the database connection pool and bring the schema up to date
    let pool = db::create_pool(&config.database_url)
        .await
        .expect("Failed to connect to the database");
    db::run_migrations(&pool)
        .await
        .expect("Failed to apply database migrations");

    let store = ProposalStore::new(pool);
    match store.ping().await {
        Ok(()) => info!("database connection check: ok"),
        Err(err) => warn!(error = %err, "database connection check failed"),
    }

    let state = AppState {
        store,
        tokens: Arc::new(TokenCodec::new(
            &config.public_token_pepper,
            &config.token_seal_key,
        )),
        google: Arc::new(GoogleVerifier::new(
            config.google_client_id.clone(),
            config.google_tokeninfo_url.clone(),
        )),
        session_ttl_minutes: config.session_ttl_minutes,
    };

    let app = routes::create_router(state);

    // Start the server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("listening on {addr}");
    axum_server::bind(addr)
        .serve(app.into_make_service())
        .await
        .expect("Server failed");
}
