//! Bearer token verification
//!
//! Tokens are HS256 JWTs carrying the user id in `sub` and the role claim.
//! Issuing tokens (login) belongs to the identity provider; `issue` exists
//! for operators and tests.

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use crate::engine::Caller;
use crate::error::{EngineError, EngineResult};
use crate::models::Role;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    #[serde(default = "default_role")]
    pub role: Role,
    pub iat: u64,
    pub exp: u64,
}

fn default_role() -> Role {
    Role::User
}

impl Claims {
    pub fn caller(&self) -> Caller {
        Caller {
            user_id: self.sub,
            role: self.role,
        }
    }
}

fn now_secs() -> EngineResult<u64> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|e| EngineError::validation(format!("System time error: {}", e)))
}

#[derive(Clone)]
pub struct TokenVerifier {
    decoding: DecodingKey,
    encoding: EncodingKey,
}

impl TokenVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            encoding: EncodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn issue(&self, user_id: Uuid, role: Role, ttl_secs: u64) -> EngineResult<String> {
        let now = now_secs()?;
        let claims = Claims {
            sub: user_id,
            role,
            iat: now,
            exp: now + ttl_secs,
        };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| EngineError::validation(format!("Failed to generate token: {}", e)))
    }

    /// Any decoding failure is `Unauthorized`; the reason is not echoed back
    pub fn verify(&self, token: &str) -> EngineResult<Claims> {
        decode::<Claims>(token, &self.decoding, &Validation::default())
            .map(|data| data.claims)
            .map_err(|_| EngineError::Unauthorized)
    }

    /// Extract the token from an `Authorization: Bearer ...` header value
    pub fn bearer(header: &str) -> Option<&str> {
        let (scheme, token) = header.split_once(' ')?;
        if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() {
            Some(token.trim())
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_and_verify() {
        let verifier = TokenVerifier::new("test-secret");
        let id = Uuid::new_v4();

        let token = verifier.issue(id, Role::Admin, 3600).unwrap();
        let caller = verifier.verify(&token).unwrap().caller();
        assert_eq!(caller.user_id, id);
        assert!(caller.is_admin());
    }

    #[test]
    fn test_wrong_secret_unauthorized() {
        let token = TokenVerifier::new("a")
            .issue(Uuid::new_v4(), Role::User, 3600)
            .unwrap();
        assert!(matches!(
            TokenVerifier::new("b").verify(&token),
            Err(EngineError::Unauthorized)
        ));
    }

    #[test]
    fn test_bearer_parsing() {
        assert_eq!(TokenVerifier::bearer("Bearer abc"), Some("abc"));
        assert_eq!(TokenVerifier::bearer("bearer  abc "), Some("abc"));
        assert_eq!(TokenVerifier::bearer("Basic abc"), None);
        assert_eq!(TokenVerifier::bearer("Bearer"), None);
    }
}
