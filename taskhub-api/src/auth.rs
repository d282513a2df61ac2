//! Bearer authentication.
//!
//! Agents authenticate with the API key issued at registration, sent as
//! `Authorization: Bearer <key>`. The cron endpoint uses a separate shared
//! secret from [`crate::config::ApiConfig::cron_secret`].

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use sha2::{Digest, Sha256};

use taskhub_core::Agent;

use crate::error::ApiError;
use crate::state::AppState;

/// The authenticated caller.
#[derive(Debug, Clone)]
pub struct AuthAgent(pub Agent);

/// Marker for requests that passed the cron secret check.
#[derive(Debug, Clone, Copy)]
pub struct CronAuth;

/// Token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    Some(token.trim()).filter(|t| !t.is_empty())
}

#[async_trait]
impl FromRequestParts<AppState> for AuthAgent {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let agent = state.market.authenticate(bearer_token(parts)).await?;
        tracing::Span::current().record("agent_id", tracing::field::display(agent.id));
        Ok(AuthAgent(agent))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for CronAuth {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Some(secret) = state.config.cron_secret.as_deref() else {
            return Ok(CronAuth);
        };
        match bearer_token(parts) {
            Some(token) if secrets_match(token, secret) => Ok(CronAuth),
            Some(_) => Err(ApiError::unauthorized("Invalid cron secret")),
            None => Err(ApiError::unauthorized("Missing cron secret")),
        }
    }
}

/// Compare digests so the comparison time does not depend on the common
/// prefix of the two strings.
fn secrets_match(given: &str, expected: &str) -> bool {
    let a = Sha256::digest(given.as_bytes());
    let b = Sha256::digest(expected.as_bytes());
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts_with(auth: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/tasks");
        if let Some(value) = auth {
            builder = builder.header(header::AUTHORIZATION, value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token(&parts_with(Some("Bearer th_abc"))), Some("th_abc"));
        assert_eq!(bearer_token(&parts_with(Some("bearer  th_abc "))), Some("th_abc"));
        assert_eq!(bearer_token(&parts_with(Some("Basic dXNlcg=="))), None);
        assert_eq!(bearer_token(&parts_with(Some("Bearer "))), None);
        assert_eq!(bearer_token(&parts_with(None)), None);
    }

    #[test]
    fn test_secrets_match() {
        assert!(secrets_match("s3cret", "s3cret"));
        assert!(!secrets_match("s3cret", "s3cret2"));
        assert!(!secrets_match("", "s3cret"));
    }
}
