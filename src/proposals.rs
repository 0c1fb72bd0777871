// src/proposals.rs
//
// Organizer-facing proposal lifecycle: create with candidate slots, list,
// read with live tallies, close, and the voter-by-voter breakdown.
use std::collections::HashSet;

use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use http::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::auth::CurrentOrganizer;
use crate::error::ApiError;
use crate::models::{ProposalRow, ProposalStatus, TimeOptionCountRow};
use crate::state::AppState;
use crate::store::{self, NewProposal, NewTimeOption};

pub const MAX_TITLE_LEN: usize = 200;
pub const MAX_DESCRIPTION_LEN: usize = 4000;
pub const MAX_TIME_OPTIONS: usize = 20;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProposalRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub time_options: Option<Vec<TimeOptionInput>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeOptionInput {
    pub start_at: DateTime<Utc>,
    pub end_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalResponse {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: ProposalStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub public_token: String,
    pub time_options: Vec<TimeOptionDto>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeOptionDto {
    pub id: Uuid,
    pub start_at: DateTime<Utc>,
    pub end_at: Option<DateTime<Utc>>,
    pub vote_count: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListProposalsResponse {
    pub items: Vec<ProposalListItem>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalListItem {
    pub id: Uuid,
    pub title: String,
    pub status: ProposalStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalVotesResponse {
    pub proposal_id: Uuid,
    pub voters: Vec<VoterDto>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoterDto {
    pub voter_id: Uuid,
    pub voter_name: Option<String>,
    pub time_option_ids: Vec<Uuid>,
}

#[derive(Debug)]
struct ValidatedProposal {
    title: String,
    description: Option<String>,
    options: Vec<(DateTime<Utc>, Option<DateTime<Utc>>)>,
}

fn validate_create(request: &CreateProposalRequest) -> Result<ValidatedProposal, ApiError> {
    let title = request.title.as_deref().unwrap_or_default().trim().to_string();
    if title.is_empty() || title.chars().count() > MAX_TITLE_LEN {
        return Err(ApiError::Validation("invalid_title"));
    }

    let description = request.description.as_deref().map(|d| d.trim().to_string());
    if let Some(description) = &description {
        if description.chars().count() > MAX_DESCRIPTION_LEN {
            return Err(ApiError::Validation("description_too_long"));
        }
    }

    let submitted = request.time_options.as_deref().unwrap_or_default();
    if submitted.is_empty() || submitted.len() > MAX_TIME_OPTIONS {
        return Err(ApiError::Validation("invalid_time_options_count"));
    }

    let mut options = Vec::with_capacity(submitted.len());
    for option in submitted {
        if let Some(end) = option.end_at {
            if end <= option.start_at {
                return Err(ApiError::Validation("invalid_time_option_range"));
            }
        }
        options.push((option.start_at, option.end_at));
    }

    let distinct: HashSet<_> = options.iter().copied().collect();
    if distinct.len() != options.len() {
        return Err(ApiError::Validation("duplicate_time_options"));
    }

    Ok(ValidatedProposal { title, description, options })
}

// Route ids that are not UUIDs read the same as absent ones.
fn parse_route_uuid(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::NotFound)
}

fn proposal_response(
    row: ProposalRow,
    public_token: String,
    options: Vec<TimeOptionCountRow>,
) -> Result<ProposalResponse, ApiError> {
    let status = ProposalStatus::from_row(&row)?;
    Ok(ProposalResponse {
        id: row.id,
        title: row.title,
        description: row.description,
        status,
        created_at: row.created_at,
        updated_at: row.updated_at,
        closed_at: row.closed_at,
        public_token,
        time_options: options
            .into_iter()
            .map(|o| TimeOptionDto {
                id: o.id,
                start_at: o.start_at,
                end_at: o.end_at,
                vote_count: o.vote_count,
            })
            .collect(),
    })
}

/// Create a proposal with its candidate slots and mint its public voting token.
pub async fn create(
    State(state): State<AppState>,
    CurrentOrganizer(organizer_id): CurrentOrganizer,
    Json(request): Json<CreateProposalRequest>,
) -> Result<(StatusCode, Json<ProposalResponse>), ApiError> {
    let validated = validate_create(&request)?;

    let token = state.tokens.generate();
    let token_hash = state.tokens.hash(&token);
    let token_sealed = state.tokens.seal(&token);

    let now = Utc::now();
    let proposal_id = Uuid::new_v4();
    let mut options: Vec<NewTimeOption> = validated
        .options
        .iter()
        .map(|&(start_at, end_at)| NewTimeOption { id: Uuid::new_v4(), start_at, end_at })
        .collect();
    options.sort_by_key(|o| (o.start_at, o.end_at));

    let new_proposal = NewProposal {
        id: proposal_id,
        organizer_user_id: organizer_id,
        title: &validated.title,
        description: validated.description.as_deref(),
        public_token_hash: &token_hash,
        public_token_sealed: &token_sealed,
        created_at: now,
    };

    if let Err(err) = state.store.create_proposal(&new_proposal, &options).await {
        return Err(match store::unique_violation(&err) {
            // A colliding token hash is a transient accident; the client
            // retries and gets a fresh token.
            Some(store::TOKEN_HASH_INDEX) => ApiError::Unavailable("token_generation_failed"),
            Some(store::OPTION_SLOT_INDEX) => ApiError::Conflict("duplicate_time_options"),
            _ => ApiError::from(err),
        });
    }

    let response = ProposalResponse {
        id: proposal_id,
        title: validated.title,
        description: validated.description,
        status: ProposalStatus::Open,
        created_at: now,
        updated_at: now,
        closed_at: None,
        public_token: token,
        time_options: options
            .iter()
            .map(|o| TimeOptionDto {
                id: o.id,
                start_at: o.start_at,
                end_at: o.end_at,
                vote_count: 0,
            })
            .collect(),
    };

    Ok((StatusCode::CREATED, Json(response)))
}

/// The caller's proposals, newest first.
pub async fn list(
    State(state): State<AppState>,
    CurrentOrganizer(organizer_id): CurrentOrganizer,
) -> Result<Json<ListProposalsResponse>, ApiError> {
    let rows = state.store.list_for_owner(organizer_id).await?;

    let mut items = Vec::with_capacity(rows.len());
    for row in rows {
        let status = ProposalStatus::from_row(&row)?;
        items.push(ProposalListItem {
            id: row.id,
            title: row.title,
            status,
            created_at: row.created_at,
            updated_at: row.updated_at,
            closed_at: row.closed_at,
        });
    }

    Ok(Json(ListProposalsResponse { items }))
}

/// Fetch one of the caller's proposals with live per-option vote counts.
pub async fn get(
    State(state): State<AppState>,
    CurrentOrganizer(organizer_id): CurrentOrganizer,
    Path(id): Path<String>,
) -> Result<Json<ProposalResponse>, ApiError> {
    let id = parse_route_uuid(&id)?;

    let row = state
        .store
        .proposal_for_owner(id, organizer_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    let options = state.store.options_with_counts(id).await?;

    // Key rotation makes old sealed tokens unreadable; the read still succeeds.
    let public_token = match state.tokens.unseal(&row.public_token_sealed) {
        Ok(token) => token,
        Err(err) => {
            warn!(proposal_id = %id, error = %err, "stored public token could not be unsealed");
            String::new()
        }
    };

    Ok(Json(proposal_response(row, public_token, options)?))
}

/// Close the poll. Repeating the call is a no-op that still succeeds.
pub async fn close(
    State(state): State<AppState>,
    CurrentOrganizer(organizer_id): CurrentOrganizer,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_route_uuid(&id)?;

    if state.store.close_proposal(id, organizer_id, Utc::now()).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound)
    }
}

/// Who voted for what, grouped per voter.
pub async fn votes(
    State(state): State<AppState>,
    CurrentOrganizer(organizer_id): CurrentOrganizer,
    Path(id): Path<String>,
) -> Result<Json<ProposalVotesResponse>, ApiError> {
    let id = parse_route_uuid(&id)?;

    if state.store.proposal_for_owner(id, organizer_id).await?.is_none() {
        return Err(ApiError::NotFound);
    }

    let voters = state
        .store
        .voters_grouped(id)
        .await?
        .into_iter()
        .map(|row| VoterDto {
            voter_id: row.voter_id,
            voter_name: row.voter_name,
            time_option_ids: row.time_option_ids,
        })
        .collect();

    Ok(Json(ProposalVotesResponse { proposal_id: id, voters }))
}
