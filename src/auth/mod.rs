pub mod guard;
pub mod jwt;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use axum_extra::headers::{authorization::Bearer, Authorization};
use axum_extra::TypedHeader;
use serde::{Deserialize, Serialize};

use crate::{error::AppError, state::AppState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }

    fn from_claim(value: &str) -> Option<Self> {
        match value {
            "user" => Some(Role::User),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

/// The trusted identity attached to every request. Credentials were verified
/// upstream when the token was minted; here the token signature is the only
/// thing checked.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Requester {
    pub id: uuid::Uuid,
    pub role: Role,
}

#[async_trait]
impl FromRequestParts<AppState> for Requester {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| AppError::Unauthorized)?;

        let claims = state
            .jwt
            .verify_token(bearer.token())
            .map_err(|_| AppError::Unauthorized)?;

        let role = Role::from_claim(&claims.role).ok_or(AppError::Unauthorized)?;

        Ok(Requester {
            id: claims.sub,
            role,
        })
    }
}
