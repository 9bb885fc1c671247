/// JWT Claims structure
///
/// Payload shared by access and refresh tokens. The `typ` claim tells the two
/// apart once the signature has been checked.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TokenError;

/// Token type discriminator, also used as the JWT header `kid`
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Access => "access",
            TokenType::Refresh => "refresh",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    /// Subject (account ID as UUID string)
    pub sub: String,
    pub email: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    pub iss: String,
    /// Unique token id; two tokens minted in the same second still differ
    pub jti: String,
    pub typ: TokenType,
}

impl Claims {
    /// Create new claims expiring `expiry_seconds` from now
    pub fn new(
        user_id: Uuid,
        email: String,
        typ: TokenType,
        expiry_seconds: i64,
        issuer: String,
    ) -> Self {
        let now = Utc::now().timestamp();
        Self {
            sub: user_id.to_string(),
            email,
            exp: now + expiry_seconds,
            iat: now,
            iss: issuer,
            jti: Uuid::new_v4().to_string(),
            typ,
        }
    }

    /// Extract the account ID from the subject
    pub fn user_id(&self) -> Result<Uuid, TokenError> {
        Uuid::parse_str(&self.sub).map_err(|_| TokenError::Malformed)
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.exp, 0)
            .single()
            .unwrap_or_else(Utc::now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claims_creation() {
        let user_id = Uuid::new_v4();
        let email = "test@example.com".to_string();
        let claims = Claims::new(user_id, email.clone(), TokenType::Access, 3600, "test".to_string());

        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.email, email);
        assert_eq!(claims.iss, "test");
        assert_eq!(claims.typ, TokenType::Access);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_each_claim_set_gets_its_own_jti() {
        let user_id = Uuid::new_v4();
        let a = Claims::new(user_id, "a@example.com".to_string(), TokenType::Refresh, 60, "t".to_string());
        let b = Claims::new(user_id, "a@example.com".to_string(), TokenType::Refresh, 60, "t".to_string());

        assert_ne!(a.jti, b.jti);
    }

    #[test]
    fn test_type_serializes_lowercase() {
        let claims = Claims::new(Uuid::new_v4(), "a@example.com".to_string(), TokenType::Refresh, 60, "t".to_string());
        let json = serde_json::to_value(&claims).unwrap();

        assert_eq!(json["typ"], "refresh");
    }

    #[test]
    fn test_invalid_user_id() {
        let mut claims = Claims::new(
            Uuid::new_v4(),
            "test@example.com".to_string(),
            TokenType::Access,
            3600,
            "test".to_string(),
        );
        claims.sub = "invalid-uuid".to_string();

        assert_eq!(claims.user_id(), Err(TokenError::Malformed));
    }

    #[test]
    fn test_expires_at_matches_exp() {
        let claims = Claims::new(Uuid::new_v4(), "a@example.com".to_string(), TokenType::Access, 900, "t".to_string());
        assert_eq!(claims.expires_at().timestamp(), claims.exp);
    }
}
