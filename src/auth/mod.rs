//! Session tokens. Sessions are issued elsewhere; this server only mints
//! tokens for tooling and tests and resolves them on every request.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::config;
use crate::error::ApiError;
use crate::types::{Role, RoleSet};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Account id of the caller
    pub sub: String,
    /// Study the session is bound to
    pub study: String,
    #[serde(default)]
    pub roles: RoleSet,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    pub fn new(user_id: impl Into<String>, study: impl Into<String>, roles: RoleSet) -> Self {
        let now = Utc::now();
        let expiry_hours = config::config().security.jwt_expiry_hours;
        let exp = (now + Duration::hours(expiry_hours as i64)).timestamp();

        Self {
            sub: user_id.into(),
            study: study.into(),
            roles,
            exp,
            iat: now.timestamp(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("JWT generation error: {0}")]
    TokenGeneration(String),
    #[error("Invalid JWT token: {0}")]
    InvalidToken(String),
    #[error("JWT secret not configured")]
    InvalidSecret,
}

fn secret() -> Result<&'static str, JwtError> {
    let secret = config::config().security.jwt_secret.as_str();
    if secret.is_empty() {
        return Err(JwtError::InvalidSecret);
    }
    Ok(secret)
}

pub fn generate_jwt(claims: &Claims) -> Result<String, JwtError> {
    let encoding_key = EncodingKey::from_secret(secret()?.as_bytes());
    encode(&Header::default(), claims, &encoding_key).map_err(|e| JwtError::TokenGeneration(e.to_string()))
}

pub fn decode_jwt(token: &str) -> Result<Claims, JwtError> {
    let decoding_key = DecodingKey::from_secret(secret()?.as_bytes());
    decode::<Claims>(token, &decoding_key, &Validation::default())
        .map(|data| data.claims)
        .map_err(|e| JwtError::InvalidToken(e.to_string()))
}

/// The resolved caller of one request
#[derive(Clone, Debug)]
pub struct UserSession {
    pub user_id: String,
    pub study_id: String,
    pub roles: RoleSet,
}

impl From<Claims> for UserSession {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.sub,
            study_id: claims.study,
            roles: claims.roles,
        }
    }
}

impl UserSession {
    /// Passes when the session holds at least one of `roles`
    pub fn require_any(&self, roles: &[Role]) -> Result<(), ApiError> {
        if self.roles.intersects(RoleSet::of(roles)) {
            Ok(())
        } else {
            tracing::debug!(
                "User {} with roles {:?} denied; needs one of {:?}",
                self.user_id,
                self.roles,
                roles
            );
            Err(ApiError::forbidden("Caller does not have permission to access this service."))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_round_trip_keeps_study_and_roles() {
        let claims = Claims::new("user-1", "api", RoleSet::of(&[Role::Developer, Role::Admin]));
        let token = generate_jwt(&claims).unwrap();
        let session = UserSession::from(decode_jwt(&token).unwrap());
        assert_eq!(session.study_id, "api");
        assert!(session.roles.contains(Role::Admin));
    }

    #[test]
    fn tampered_token_is_rejected() {
        let token = generate_jwt(&Claims::new("user-1", "api", RoleSet::empty())).unwrap();
        let tampered = format!("{}x", token);
        assert!(matches!(decode_jwt(&tampered), Err(JwtError::InvalidToken(_))));
    }

    #[test]
    fn role_check_needs_an_overlap() {
        let session = UserSession {
            user_id: "user-1".to_string(),
            study_id: "api".to_string(),
            roles: RoleSet::of(&[Role::Researcher]),
        };
        assert!(session.require_any(&[Role::Developer, Role::Researcher]).is_ok());
        let err = session.require_any(&[Role::Admin]).unwrap_err();
        assert_eq!(err.status_code(), 403);
        assert_eq!(err.error_type(), "UnauthorizedException");
    }
}
