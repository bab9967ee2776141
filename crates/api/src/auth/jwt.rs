//! JWT issuance and validation
//!
//! Tokens are signed HS256 with the process-wide secret and expire after
//! [`TOKEN_TTL`]. There is no password: possession of a valid token for an
//! email IS the authentication (log in = register policy).

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};

/// Access token lifetime
pub const TOKEN_TTL: Duration = Duration::days(7);

/// Token claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: Uuid,
    pub email: String,
    pub iat: i64,
    pub exp: i64,
}

/// Issues and validates access tokens
#[derive(Clone)]
pub struct JwtManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtManager {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Issue a signed, time-limited token for a user
    pub fn issue(&self, user_id: Uuid, email: &str) -> ApiResult<String> {
        let now = OffsetDateTime::now_utc();
        let claims = Claims {
            sub: user_id,
            email: email.to_string(),
            iat: now.unix_timestamp(),
            exp: (now + TOKEN_TTL).unix_timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key).map_err(|err| {
            tracing::error!(error = %err, "Failed to sign access token");
            ApiError::Internal
        })
    }

    /// Validate a token and return its claims
    ///
    /// Missing, expired, malformed, or wrongly-signed tokens all collapse
    /// to `Unauthenticated`; callers get no distinction to work with.
    pub fn validate(&self, token: &str) -> ApiResult<Claims> {
        let validation = Validation::new(Algorithm::HS256);
        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|_| ApiError::Unauthenticated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_round_trips() {
        let manager = JwtManager::new("test-secret");
        let user_id = Uuid::new_v4();

        let token = manager.issue(user_id, "user@example.com").unwrap();
        let claims = manager.validate(&token).unwrap();

        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.email, "user@example.com");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn same_token_resolves_to_same_user() {
        let manager = JwtManager::new("test-secret");
        let user_id = Uuid::new_v4();
        let token = manager.issue(user_id, "user@example.com").unwrap();

        let first = manager.validate(&token).unwrap();
        let second = manager.validate(&token).unwrap();
        assert_eq!(first.sub, second.sub);
    }

    #[test]
    fn expired_token_rejected() {
        let manager = JwtManager::new("test-secret");
        let now = OffsetDateTime::now_utc();
        let claims = Claims {
            sub: Uuid::new_v4(),
            email: "user@example.com".to_string(),
            // Expired two days ago, far past any validation leeway
            iat: (now - Duration::days(9)).unix_timestamp(),
            exp: (now - Duration::days(2)).unix_timestamp(),
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();

        let err = manager.validate(&token).unwrap_err();
        assert_eq!(err.kind(), "unauthenticated");
    }

    #[test]
    fn token_signed_with_other_secret_rejected() {
        let issuer = JwtManager::new("secret-a");
        let validator = JwtManager::new("secret-b");

        let token = issuer.issue(Uuid::new_v4(), "user@example.com").unwrap();
        assert!(validator.validate(&token).is_err());
    }

    #[test]
    fn malformed_token_rejected() {
        let manager = JwtManager::new("test-secret");

        assert!(manager.validate("").is_err());
        assert!(manager.validate("not.a.jwt").is_err());
        assert!(manager.validate("a.b").is_err());
    }
}
