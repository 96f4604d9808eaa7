//! HS256 bearer tokens.
//!
//! Compact JWTs signed and checked with `jsonwebtoken`. Only `HS256` is
//! accepted on the way in and `exp` is required.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::Zeroizing;

/// Why a token was refused or could not be produced.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// Not a well-formed JWT, or the claims do not match [`Claims`].
    #[error("malformed token")]
    Malformed,
    /// Header names an algorithm other than HS256.
    #[error("unsupported token algorithm")]
    UnsupportedAlgorithm,
    /// Signature does not match.
    #[error("invalid token signature")]
    BadSignature,
    /// `exp` is in the past.
    #[error("token has expired")]
    Expired,
    #[error("token signing failed: {0}")]
    Signing(String),
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::InvalidAlgorithm => Self::UnsupportedAlgorithm,
            ErrorKind::InvalidSignature => Self::BadSignature,
            ErrorKind::ExpiredSignature => Self::Expired,
            _ => Self::Malformed,
        }
    }
}

/// Token payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: i64,
    pub email: String,
    pub username: String,
    /// Expiry, seconds since the epoch.
    pub exp: i64,
    /// Issued at, seconds since the epoch.
    pub iat: i64,
}

/// Issues and verifies tokens with one shared secret.
#[derive(Clone)]
pub struct TokenService {
    secret: Zeroizing<Vec<u8>>,
    lifetime: Duration,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("secret", &"[REDACTED]")
            .field("lifetime", &self.lifetime)
            .finish()
    }
}

impl TokenService {
    pub fn new(secret: Zeroizing<Vec<u8>>, lifetime_hours: i64) -> Self {
        Self {
            secret,
            lifetime: Duration::hours(lifetime_hours),
        }
    }

    /// Sign a token for `user_id` valid from `now` for the configured lifetime.
    pub fn issue(
        &self,
        user_id: i64,
        email: &str,
        username: &str,
        now: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        let claims = Claims {
            user_id,
            email: email.to_string(),
            username: username.to_string(),
            exp: (now + self.lifetime).timestamp(),
            iat: now.timestamp(),
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(&self.secret),
        )
        .map_err(|err| TokenError::Signing(err.to_string()))
    }

    /// Check algorithm, signature and expiry against the current time,
    /// returning the claims.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);
        let data = decode::<Claims>(token, &DecodingKey::from_secret(&self.secret), &validation)?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> TokenService {
        TokenService::new(Zeroizing::new(b"test-secret-with-at-least-32-bytes!".to_vec()), 24)
    }

    #[test]
    fn issued_token_verifies() {
        let svc = service();
        let token = svc.issue(42, "amina@example.com", "amina", Utc::now()).unwrap();
        assert_eq!(token.split('.').count(), 3);
        let claims = svc.verify(&token).unwrap();
        assert_eq!(claims.user_id, 42);
        assert_eq!(claims.username, "amina");
        assert_eq!(claims.exp - claims.iat, 24 * 3600);
    }

    #[test]
    fn expired_token_rejected() {
        let issued = Utc::now() - Duration::hours(25);
        let svc = service();
        let token = svc.issue(1, "a@example.com", "a", issued).unwrap();
        assert_eq!(svc.verify(&token), Err(TokenError::Expired));
    }

    #[test]
    fn tampered_payload_rejected() {
        let now = Utc::now();
        let svc = service();
        let token = svc.issue(1, "a@example.com", "a", now).unwrap();
        let forged = TokenService::new(Zeroizing::new(vec![9u8; 32]), 24)
            .issue(2, "a@example.com", "a", now)
            .unwrap();
        let parts: Vec<&str> = token.split('.').collect();
        let forged_parts: Vec<&str> = forged.split('.').collect();
        let spliced = format!("{}.{}.{}", parts[0], forged_parts[1], parts[2]);
        assert_eq!(svc.verify(&spliced), Err(TokenError::BadSignature));
    }

    #[test]
    fn other_secret_rejected() {
        let token = service().issue(1, "a@example.com", "a", Utc::now()).unwrap();
        let other = TokenService::new(Zeroizing::new(vec![7u8; 32]), 24);
        assert_eq!(other.verify(&token), Err(TokenError::BadSignature));
    }

    #[test]
    fn malformed_inputs() {
        let svc = service();
        assert_eq!(svc.verify(""), Err(TokenError::Malformed));
        assert_eq!(svc.verify("a.b"), Err(TokenError::Malformed));
        assert_eq!(svc.verify("!!!.???.***"), Err(TokenError::Malformed));
    }

    #[test]
    fn other_algorithm_refused() {
        let svc = service();
        let now = Utc::now();
        let claims = Claims {
            user_id: 1,
            email: "a@example.com".into(),
            username: "a".into(),
            exp: now.timestamp() + 3600,
            iat: now.timestamp(),
        };
        let token = encode(
            &Header::new(Algorithm::HS384),
            &claims,
            &EncodingKey::from_secret(b"test-secret-with-at-least-32-bytes!"),
        )
        .unwrap();
        assert_eq!(svc.verify(&token), Err(TokenError::UnsupportedAlgorithm));
    }

    #[test]
    fn debug_redacts_secret() {
        assert!(!format!("{:?}", service()).contains("test-secret"));
    }
}
