// src/auth.rs
use axum::extract::{FromRequestParts, State};
use axum::Json;
use chrono::{DateTime, Duration, Utc};
use http::header::AUTHORIZATION;
use http::request::Parts;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("tokeninfo request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("id token rejected")]
    Rejected,
    #[error("id token audience mismatch")]
    AudienceMismatch,
}

/// Identity claims extracted from a validated Google id token.
#[derive(Debug, Clone)]
pub struct GoogleClaims {
    pub subject: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub picture_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenInfo {
    aud: String,
    sub: String,
    email: Option<String>,
    name: Option<String>,
    picture: Option<String>,
}

fn claims_from(info: TokenInfo, client_id: &str) -> Result<GoogleClaims, VerifyError> {
    if info.aud != client_id {
        return Err(VerifyError::AudienceMismatch);
    }
    Ok(GoogleClaims {
        subject: info.sub,
        email: info.email,
        display_name: info.name,
        picture_url: info.picture,
    })
}

pub struct GoogleVerifier {
    http: reqwest::Client,
    client_id: String,
    tokeninfo_url: String,
}

impl GoogleVerifier {
    pub fn new(client_id: String, tokeninfo_url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            client_id,
            tokeninfo_url,
        }
    }

    /// Validate an id token against Google's tokeninfo endpoint.
    pub async fn verify(&self, id_token: &str) -> Result<GoogleClaims, VerifyError> {
        let response = self
            .http
            .get(&self.tokeninfo_url)
            .query(&[("id_token", id_token)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(VerifyError::Rejected);
        }

        let info: TokenInfo = response.json().await?;
        claims_from(info, &self.client_id)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleLoginRequest {
    pub id_token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub access_token: String,
    pub expires_at_utc: DateTime<Utc>,
    pub user: UserDto,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDto {
    pub id: Uuid,
    pub email: String,
    pub display_name: Option<String>,
    pub picture_url: Option<String>,
}

/// Exchange a Google id token for an API access token, creating the organizer
/// on first sign-in and refreshing their profile on every later one.
pub async fn google_login(
    State(state): State<AppState>,
    Json(request): Json<GoogleLoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let id_token = request.id_token.as_deref().map(str::trim).unwrap_or_default();
    if id_token.is_empty() {
        return Err(ApiError::Validation("id_token_required"));
    }

    let claims = state.google.verify(id_token).await.map_err(|err| {
        debug!(error = %err, "google id token verification failed");
        ApiError::Validation("invalid_google_id_token")
    })?;

    if claims.subject.trim().is_empty() {
        return Err(ApiError::Validation("google_token_missing_claims"));
    }
    let email = claims
        .email
        .filter(|email| !email.trim().is_empty())
        .ok_or(ApiError::Validation("google_token_missing_claims"))?;

    let now = Utc::now();
    let organizer = state
        .store
        .upsert_organizer(
            &claims.subject,
            &email,
            claims.display_name.as_deref(),
            claims.picture_url.as_deref(),
            now,
        )
        .await?;

    let access_token = state.tokens.generate();
    let token_hash = state.tokens.hash(&access_token);
    let expires_at = now + Duration::minutes(state.session_ttl_minutes);
    state
        .store
        .insert_session(Uuid::new_v4(), organizer.id, &token_hash, now, expires_at)
        .await?;

    Ok(Json(LoginResponse {
        access_token,
        expires_at_utc: expires_at,
        user: UserDto {
            id: organizer.id,
            email: organizer.email,
            display_name: organizer.display_name,
            picture_url: organizer.picture_url,
        },
    }))
}

/// Caller identity resolved from the bearer token. Handlers receive it as an
/// explicit value; nothing downstream reads ambient request state.
pub struct CurrentOrganizer(pub Uuid);

impl FromRequestParts<AppState> for CurrentOrganizer {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or(ApiError::Unauthenticated)?;

        let token_hash = state.tokens.hash(token);
        let user_id = state
            .store
            .session_user(&token_hash, Utc::now())
            .await?
            .ok_or(ApiError::Unauthenticated)?;

        Ok(CurrentOrganizer(user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_info(aud: &str) -> TokenInfo {
        TokenInfo {
            aud: aud.to_string(),
            sub: "108000000000000000001".to_string(),
            email: Some("organizer@example.com".to_string()),
            name: Some("An Organizer".to_string()),
            picture: Some("https://example.com/p.png".to_string()),
        }
    }

    #[test]
    fn claims_require_a_matching_audience() {
        let result = claims_from(token_info("some-other-client"), "expected-client");
        assert!(matches!(result, Err(VerifyError::AudienceMismatch)));
    }

    #[test]
    fn claims_carry_the_profile_fields() {
        let claims = claims_from(token_info("client-id"), "client-id").unwrap();
        assert_eq!(claims.subject, "108000000000000000001");
        assert_eq!(claims.email.as_deref(), Some("organizer@example.com"));
        assert_eq!(claims.display_name.as_deref(), Some("An Organizer"));
        assert_eq!(claims.picture_url.as_deref(), Some("https://example.com/p.png"));
    }

    #[test]
    fn tokeninfo_payload_deserializes() {
        // Shape returned by the tokeninfo endpoint; unused claims are ignored.
        let info: TokenInfo = serde_json::from_str(
            r#"{
                "iss": "https://accounts.google.com",
                "aud": "client-id",
                "sub": "108000000000000000001",
                "email": "organizer@example.com",
                "email_verified": "true",
                "name": "An Organizer",
                "picture": "https://example.com/p.png",
                "exp": "1768000000"
            }"#,
        )
        .unwrap();
        assert_eq!(info.aud, "client-id");
        assert_eq!(info.sub, "108000000000000000001");
    }

    #[test]
    fn tokeninfo_profile_fields_are_optional() {
        let info: TokenInfo =
            serde_json::from_str(r#"{"aud": "client-id", "sub": "42"}"#).unwrap();
        let claims = claims_from(info, "client-id").unwrap();
        assert!(claims.email.is_none());
        assert!(claims.display_name.is_none());
        assert!(claims.picture_url.is_none());
    }
}
