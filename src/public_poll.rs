// src/public_poll.rs
//
// Anonymous-facing surface, addressed purely by public token. The voter id is
// an idempotency key for the ballot, never a security principal.
use std::collections::HashSet;

use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::{ProposalStatus, TimeOptionCountRow};
use crate::state::AppState;

pub const MAX_BALLOT_OPTIONS: usize = 20;
pub const MAX_VOTER_NAME_LEN: usize = 200;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicPollResponse {
    pub proposal_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: ProposalStatus,
    pub time_options: Vec<PublicTimeOptionDto>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicTimeOptionDto {
    pub id: Uuid,
    pub start_at: DateTime<Utc>,
    pub end_at: Option<DateTime<Utc>>,
    pub vote_count: i64,
    pub is_leading: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitVotesRequest {
    pub voter_id: Option<Uuid>,
    pub voter_name: Option<String>,
    pub time_option_ids: Option<Vec<Uuid>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitVotesResponse {
    pub voter_id: Uuid,
}

/// An option leads when it ties the maximum count and at least one vote exists;
/// with no votes at all, nothing leads.
fn tally_options(options: &[TimeOptionCountRow]) -> Vec<PublicTimeOptionDto> {
    let max_votes = options.iter().map(|o| o.vote_count).max().unwrap_or(0);
    options
        .iter()
        .map(|o| PublicTimeOptionDto {
            id: o.id,
            start_at: o.start_at,
            end_at: o.end_at,
            vote_count: o.vote_count,
            is_leading: max_votes > 0 && o.vote_count == max_votes,
        })
        .collect()
}

#[derive(Debug)]
struct ValidatedBallot {
    voter_id: Uuid,
    voter_name: Option<String>,
    time_option_ids: Vec<Uuid>,
}

fn validate_ballot(request: SubmitVotesRequest) -> Result<ValidatedBallot, ApiError> {
    let Some(time_option_ids) = request.time_option_ids else {
        return Err(ApiError::Validation("invalid_time_option_ids"));
    };
    if time_option_ids.len() > MAX_BALLOT_OPTIONS {
        return Err(ApiError::Validation("too_many_votes"));
    }
    let distinct: HashSet<_> = time_option_ids.iter().copied().collect();
    if distinct.len() != time_option_ids.len() {
        return Err(ApiError::Validation("duplicate_time_option_ids"));
    }

    let voter_name = request.voter_name.as_deref().map(|name| name.trim().to_string());
    if let Some(name) = &voter_name {
        if name.chars().count() > MAX_VOTER_NAME_LEN {
            return Err(ApiError::Validation("voter_name_too_long"));
        }
    }

    // First-time voters (absent or all-zero id) get a fresh identity they can
    // keep for later resubmissions.
    let voter_id = match request.voter_id {
        Some(id) if !id.is_nil() => id,
        _ => Uuid::new_v4(),
    };

    Ok(ValidatedBallot { voter_id, voter_name, time_option_ids })
}

/// Anonymous poll view: per-option tallies plus the currently leading options.
pub async fn get_poll(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<PublicPollResponse>, ApiError> {
    if token.trim().is_empty() {
        return Err(ApiError::NotFound);
    }

    let token_hash = state.tokens.hash(&token);
    let row = state
        .store
        .proposal_by_token_hash(&token_hash)
        .await?
        .ok_or(ApiError::NotFound)?;
    let status = ProposalStatus::from_row(&row)?;
    let options = state.store.options_with_counts(row.id).await?;

    Ok(Json(PublicPollResponse {
        proposal_id: row.id,
        title: row.title,
        description: row.description,
        status,
        time_options: tally_options(&options),
    }))
}

/// Replace the caller's whole ballot for the poll behind `token`. An empty
/// option list is an explicit retraction. Returns the voter id to reuse.
pub async fn submit_votes(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(request): Json<SubmitVotesRequest>,
) -> Result<Json<SubmitVotesResponse>, ApiError> {
    if token.trim().is_empty() {
        return Err(ApiError::NotFound);
    }

    let ballot = validate_ballot(request)?;

    let token_hash = state.tokens.hash(&token);
    let proposal = state
        .store
        .proposal_by_token_hash(&token_hash)
        .await?
        .ok_or(ApiError::NotFound)?;

    // Closed polls reject new ballots outright rather than dropping them.
    if ProposalStatus::from_row(&proposal)? != ProposalStatus::Open {
        return Err(ApiError::Conflict("poll_closed"));
    }

    let known: HashSet<Uuid> = state.store.option_ids(proposal.id).await?.into_iter().collect();
    if ballot.time_option_ids.iter().any(|id| !known.contains(id)) {
        return Err(ApiError::Validation("invalid_time_option_ids"));
    }

    state
        .store
        .replace_votes(
            proposal.id,
            ballot.voter_id,
            ballot.voter_name.as_deref(),
            &ballot.time_option_ids,
            Utc::now(),
        )
        .await?;

    Ok(Json(SubmitVotesResponse { voter_id: ballot.voter_id }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn option(count: i64) -> TimeOptionCountRow {
        TimeOptionCountRow {
            id: Uuid::new_v4(),
            start_at: Utc::now(),
            end_at: None,
            vote_count: count,
        }
    }

    fn ballot_request(ids: Option<Vec<Uuid>>) -> SubmitVotesRequest {
        SubmitVotesRequest { voter_id: None, voter_name: None, time_option_ids: ids }
    }

    #[test]
    fn tied_leaders_are_all_flagged() {
        let options = vec![option(2), option(2), option(1)];
        let tallied = tally_options(&options);
        assert_eq!(
            tallied.iter().map(|o| o.is_leading).collect::<Vec<_>>(),
            vec![true, true, false]
        );
    }

    #[test]
    fn nothing_leads_at_zero_votes() {
        let options = vec![option(0), option(0), option(0)];
        assert!(tally_options(&options).iter().all(|o| !o.is_leading));
    }

    #[test]
    fn a_single_backed_option_leads() {
        let options = vec![option(0), option(3)];
        let tallied = tally_options(&options);
        assert!(!tallied[0].is_leading);
        assert!(tallied[1].is_leading);
    }

    #[test]
    fn tallying_an_empty_option_set_is_fine() {
        assert!(tally_options(&[]).is_empty());
    }

    #[test]
    fn counts_are_carried_through() {
        let options = vec![option(5)];
        assert_eq!(tally_options(&options)[0].vote_count, 5);
    }

    #[test]
    fn a_missing_id_list_is_rejected() {
        let err = validate_ballot(ballot_request(None)).unwrap_err();
        assert!(matches!(err, ApiError::Validation("invalid_time_option_ids")));
    }

    #[test]
    fn ballots_are_capped_at_20_options() {
        let ids: Vec<Uuid> = (0..21).map(|_| Uuid::new_v4()).collect();
        let err = validate_ballot(ballot_request(Some(ids))).unwrap_err();
        assert!(matches!(err, ApiError::Validation("too_many_votes")));

        let ids: Vec<Uuid> = (0..20).map(|_| Uuid::new_v4()).collect();
        assert!(validate_ballot(ballot_request(Some(ids))).is_ok());
    }

    #[test]
    fn duplicate_ids_within_a_ballot_are_rejected() {
        let id = Uuid::new_v4();
        let err = validate_ballot(ballot_request(Some(vec![id, id]))).unwrap_err();
        assert!(matches!(err, ApiError::Validation("duplicate_time_option_ids")));
    }

    #[test]
    fn an_empty_ballot_is_a_valid_retraction() {
        let validated = validate_ballot(ballot_request(Some(vec![]))).unwrap();
        assert!(validated.time_option_ids.is_empty());
    }

    #[test]
    fn voter_names_are_trimmed_and_bounded() {
        let mut request = ballot_request(Some(vec![]));
        request.voter_name = Some("  Dana  ".to_string());
        assert_eq!(validate_ballot(request).unwrap().voter_name.as_deref(), Some("Dana"));

        let mut request = ballot_request(Some(vec![]));
        request.voter_name = Some("n".repeat(201));
        assert!(matches!(
            validate_ballot(request).unwrap_err(),
            ApiError::Validation("voter_name_too_long")
        ));
    }

    #[test]
    fn absent_and_nil_voter_ids_mint_a_fresh_identity() {
        let minted = validate_ballot(ballot_request(Some(vec![]))).unwrap().voter_id;
        assert!(!minted.is_nil());

        let mut request = ballot_request(Some(vec![]));
        request.voter_id = Some(Uuid::nil());
        let coalesced = validate_ballot(request).unwrap().voter_id;
        assert!(!coalesced.is_nil());
        assert_ne!(minted, coalesced);
    }

    #[test]
    fn a_supplied_voter_id_is_kept() {
        let supplied = Uuid::new_v4();
        let mut request = ballot_request(Some(vec![]));
        request.voter_id = Some(supplied);
        assert_eq!(validate_ballot(request).unwrap().voter_id, supplied);
    }
}
