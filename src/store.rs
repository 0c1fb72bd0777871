// src/store.rs
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{OrganizerRow, ProposalRow, ProposalStatus, TimeOptionCountRow, VoterGroupRow};

const PG_UNIQUE_VIOLATION: &str = "23505";

/// Constraint names reported by Postgres on duplicate-key failures.
pub const TOKEN_HASH_INDEX: &str = "ix_meeting_proposals_public_token_hash";
pub const OPTION_SLOT_INDEX: &str = "ix_meeting_time_options_slot";

/// Names the violated unique index when `err` is a Postgres duplicate-key error.
pub fn unique_violation(err: &sqlx::Error) -> Option<&str> {
    match err {
        sqlx::Error::Database(db) if db.code().as_deref() == Some(PG_UNIQUE_VIOLATION) => {
            db.constraint()
        }
        _ => None,
    }
}

pub struct NewProposal<'a> {
    pub id: Uuid,
    pub organizer_user_id: Uuid,
    pub title: &'a str,
    pub description: Option<&'a str>,
    pub public_token_hash: &'a [u8],
    pub public_token_sealed: &'a str,
    pub created_at: DateTime<Utc>,
}

pub struct NewTimeOption {
    pub id: Uuid,
    pub start_at: DateTime<Utc>,
    pub end_at: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct ProposalStore {
    pool: PgPool,
}

impl ProposalStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await.map(|_| ())
    }

    /// Create-or-refresh an organizer keyed by the identity provider's subject.
    pub async fn upsert_organizer(
        &self,
        google_subject: &str,
        email: &str,
        display_name: Option<&str>,
        picture_url: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<OrganizerRow, sqlx::Error> {
        sqlx::query_as::<_, OrganizerRow>(
            r#"
            INSERT INTO app_users (id, google_subject, email, display_name, picture_url, created_at, last_login_at)
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            ON CONFLICT (google_subject) DO UPDATE
            SET email = EXCLUDED.email,
                display_name = EXCLUDED.display_name,
                picture_url = EXCLUDED.picture_url,
                last_login_at = EXCLUDED.last_login_at
            RETURNING id, google_subject, email, display_name, picture_url, created_at, last_login_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(google_subject)
        .bind(email)
        .bind(display_name)
        .bind(picture_url)
        .bind(now)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn insert_session(
        &self,
        id: Uuid,
        user_id: Uuid,
        token_hash: &[u8],
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO auth_sessions (id, user_id, token_hash, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(token_hash)
        .bind(now)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map(|_| ())
    }

    /// Resolve a bearer-token hash to its organizer, if the session is still live.
    pub async fn session_user(
        &self,
        token_hash: &[u8],
        now: DateTime<Utc>,
    ) -> Result<Option<Uuid>, sqlx::Error> {
        sqlx::query_scalar::<_, Uuid>(
            "SELECT user_id FROM auth_sessions WHERE token_hash = $1 AND expires_at > $2",
        )
        .bind(token_hash)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
    }

    /// Insert the proposal and all of its options in one transaction.
    pub async fn create_proposal(
        &self,
        proposal: &NewProposal<'_>,
        options: &[NewTimeOption],
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO meeting_proposals
                (id, organizer_user_id, title, description, status, public_token_hash,
                 public_token_sealed, public_token_created_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8, $8)
            "#,
        )
        .bind(proposal.id)
        .bind(proposal.organizer_user_id)
        .bind(proposal.title)
        .bind(proposal.description)
        .bind(ProposalStatus::Open.as_str())
        .bind(proposal.public_token_hash)
        .bind(proposal.public_token_sealed)
        .bind(proposal.created_at)
        .execute(&mut *tx)
        .await?;

        for option in options {
            sqlx::query(
                r#"
                INSERT INTO meeting_time_options (id, meeting_proposal_id, start_at, end_at, created_at)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(option.id)
            .bind(proposal.id)
            .bind(option.start_at)
            .bind(option.end_at)
            .bind(proposal.created_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await
    }

    pub async fn list_for_owner(&self, owner: Uuid) -> Result<Vec<ProposalRow>, sqlx::Error> {
        sqlx::query_as::<_, ProposalRow>(
            r#"
            SELECT id, organizer_user_id, title, description, status, public_token_sealed,
                   created_at, updated_at, closed_at
            FROM meeting_proposals
            WHERE organizer_user_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await
    }

    /// Absent rows and rows owned by someone else are indistinguishable here.
    pub async fn proposal_for_owner(
        &self,
        id: Uuid,
        owner: Uuid,
    ) -> Result<Option<ProposalRow>, sqlx::Error> {
        sqlx::query_as::<_, ProposalRow>(
            r#"
            SELECT id, organizer_user_id, title, description, status, public_token_sealed,
                   created_at, updated_at, closed_at
            FROM meeting_proposals
            WHERE id = $1 AND organizer_user_id = $2
            "#,
        )
        .bind(id)
        .bind(owner)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn proposal_by_token_hash(
        &self,
        token_hash: &[u8],
    ) -> Result<Option<ProposalRow>, sqlx::Error> {
        sqlx::query_as::<_, ProposalRow>(
            r#"
            SELECT id, organizer_user_id, title, description, status, public_token_sealed,
                   created_at, updated_at, closed_at
            FROM meeting_proposals
            WHERE public_token_hash = $1
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await
    }

    /// Live per-option tallies, ordered by start time.
    pub async fn options_with_counts(
        &self,
        proposal_id: Uuid,
    ) -> Result<Vec<TimeOptionCountRow>, sqlx::Error> {
        sqlx::query_as::<_, TimeOptionCountRow>(
            r#"
            SELECT o.id, o.start_at, o.end_at, COUNT(v.id) AS vote_count
            FROM meeting_time_options o
            LEFT JOIN time_option_votes v ON v.time_option_id = o.id
            WHERE o.meeting_proposal_id = $1
            GROUP BY o.id, o.start_at, o.end_at
            ORDER BY o.start_at ASC, o.id ASC
            "#,
        )
        .bind(proposal_id)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn option_ids(&self, proposal_id: Uuid) -> Result<Vec<Uuid>, sqlx::Error> {
        sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM meeting_time_options WHERE meeting_proposal_id = $1",
        )
        .bind(proposal_id)
        .fetch_all(&self.pool)
        .await
    }

    /// Close is idempotent: `closed_at` is written by the first transition only.
    /// Returns false when the proposal does not exist or is not owned by `owner`.
    pub async fn close_proposal(
        &self,
        id: Uuid,
        owner: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error> {
        let updated = sqlx::query(
            r#"
            UPDATE meeting_proposals
            SET status = $3, closed_at = $4, updated_at = $4
            WHERE id = $1 AND organizer_user_id = $2 AND status = $5
            "#,
        )
        .bind(id)
        .bind(owner)
        .bind(ProposalStatus::Closed.as_str())
        .bind(now)
        .bind(ProposalStatus::Open.as_str())
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() > 0 {
            return Ok(true);
        }

        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM meeting_proposals WHERE id = $1 AND organizer_user_id = $2)",
        )
        .bind(id)
        .bind(owner)
        .fetch_one(&self.pool)
        .await
    }

    /// Atomically replace the voter's ballot: delete every existing row for
    /// (proposal, voter), then insert one row per submitted option. An empty
    /// set is a full retraction.
    pub async fn replace_votes(
        &self,
        proposal_id: Uuid,
        voter_id: Uuid,
        voter_name: Option<&str>,
        option_ids: &[Uuid],
        now: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        // Serializes racing resubmissions of one ballot; other voters hash to
        // other lock keys and proceed concurrently.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1::text || $2::text, 0))")
            .bind(proposal_id)
            .bind(voter_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM time_option_votes WHERE meeting_proposal_id = $1 AND voter_id = $2")
            .bind(proposal_id)
            .bind(voter_id)
            .execute(&mut *tx)
            .await?;

        for option_id in option_ids {
            sqlx::query(
                r#"
                INSERT INTO time_option_votes
                    (id, meeting_proposal_id, time_option_id, voter_id, voter_name, created_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(proposal_id)
            .bind(option_id)
            .bind(voter_id)
            .bind(voter_name)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await
    }

    /// Voter-by-voter breakdown, unnamed voters first, ties broken by voter id.
    pub async fn voters_grouped(
        &self,
        proposal_id: Uuid,
    ) -> Result<Vec<VoterGroupRow>, sqlx::Error> {
        sqlx::query_as::<_, VoterGroupRow>(
            r#"
            SELECT voter_id, voter_name,
                   ARRAY_AGG(time_option_id ORDER BY time_option_id) AS time_option_ids
            FROM time_option_votes
            WHERE meeting_proposal_id = $1
            GROUP BY voter_id, voter_name
            ORDER BY voter_name ASC NULLS FIRST, voter_id ASC
            "#,
        )
        .bind(proposal_id)
        .fetch_all(&self.pool)
        .await
    }
}
