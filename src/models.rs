// models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProposalStatus {
    Open,
    Closed,
}

impl ProposalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ProposalStatus::Open => "open",
            ProposalStatus::Closed => "closed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "open" => Some(ProposalStatus::Open),
            "closed" => Some(ProposalStatus::Closed),
            _ => None,
        }
    }

    pub fn from_row(row: &ProposalRow) -> Result<Self, ApiError> {
        Self::parse(&row.status).ok_or_else(|| {
            ApiError::Internal(format!("proposal {} has unknown status {:?}", row.id, row.status))
        })
    }
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct OrganizerRow {
    pub id: Uuid,
    pub google_subject: String,
    pub email: String,
    pub display_name: Option<String>,
    pub picture_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_login_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProposalRow {
    pub id: Uuid,
    pub organizer_user_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub public_token_sealed: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct TimeOptionCountRow {
    pub id: Uuid,
    pub start_at: DateTime<Utc>,
    pub end_at: Option<DateTime<Utc>>,
    pub vote_count: i64,
}

/// One distinct (voter, name) pair and the options they currently back.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct VoterGroupRow {
    pub voter_id: Uuid,
    pub voter_name: Option<String>,
    pub time_option_ids: Vec<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_text() {
        for status in [ProposalStatus::Open, ProposalStatus::Closed] {
            assert_eq!(ProposalStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn status_rejects_unknown_text() {
        assert_eq!(ProposalStatus::parse("reopened"), None);
        assert_eq!(ProposalStatus::parse(""), None);
        assert_eq!(ProposalStatus::parse("Open"), None);
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&ProposalStatus::Open).unwrap(), "\"open\"");
        assert_eq!(serde_json::to_string(&ProposalStatus::Closed).unwrap(), "\"closed\"");
    }
}
