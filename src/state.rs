// src/state.rs
use std::sync::Arc;

use crate::auth::GoogleVerifier;
use crate::store::ProposalStore;
use crate::token::TokenCodec;

#[derive(Clone)]
pub struct AppState {
    pub store: ProposalStore,
    pub tokens: Arc<TokenCodec>,
    pub google: Arc<GoogleVerifier>,
    pub session_ttl_minutes: i64,
}
