//! Bearer-credential extraction for mutating routes

use crate::error::ArenaError;
use crate::service::api_error::ApiError;
use crate::service::app::AppState;
use crate::types::Agent;
use axum::{extract::FromRequestParts, http::header::AUTHORIZATION, http::request::Parts};
use std::sync::Arc;

/// The agent resolved from `Authorization: Bearer <credential>`
#[derive(Debug, Clone)]
pub struct AuthenticatedAgent(pub Agent);

impl AuthenticatedAgent {
    /// Reject a body that names a different agent than the credential
    pub fn act_as(&self, claimed_agent_id: &str) -> Result<&Agent, ApiError> {
        if self.0.id != claimed_agent_id {
            return Err(ArenaError::Forbidden {
                reason: "agent_id does not match API key".to_string(),
            }
            .into());
        }
        Ok(&self.0)
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))?;
    Some(token.trim())
}

impl FromRequestParts<Arc<AppState>> for AuthenticatedAgent {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or_else(|| ArenaError::Unauthenticated {
            reason: "Missing Authorization header".to_string(),
        })?;
        let agent = state.registry().authenticate(token)?;
        Ok(Self(agent))
    }
}
