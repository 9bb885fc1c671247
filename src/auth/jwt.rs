/// JWT Token Generation and Validation
///
/// `TokenCodec` signs and verifies access and refresh tokens. Each type has its
/// own secret and TTL. The header `kid` names the token type so a token of the
/// wrong kind is reported as such before any signature work.

use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use uuid::Uuid;

use crate::auth::claims::{Claims, TokenType};
use crate::configuration::JwtSettings;
use crate::error::{AppError, ConfigError, TokenError};

const MIN_SECRET_LENGTH: usize = 32;

/// A freshly signed token and its lifetime
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_in: i64,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
struct SigningKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: i64,
}

impl SigningKeys {
    fn new(secret: &str, ttl: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }
}

#[derive(Clone)]
pub struct TokenCodec {
    access: SigningKeys,
    refresh: SigningKeys,
    issuer: String,
}

impl TokenCodec {
    /// Build a codec from explicit settings.
    ///
    /// # Errors
    /// Returns a config error if a secret is shorter than 32 bytes, the two
    /// secrets are equal, or a TTL is not positive.
    pub fn new(settings: &JwtSettings) -> Result<Self, ConfigError> {
        for (name, secret) in [
            ("jwt.access_secret", &settings.access_secret),
            ("jwt.refresh_secret", &settings.refresh_secret),
        ] {
            if secret.len() < MIN_SECRET_LENGTH {
                return Err(ConfigError::InvalidValue(format!(
                    "{} must be at least {} bytes",
                    name, MIN_SECRET_LENGTH
                )));
            }
        }

        if settings.access_secret == settings.refresh_secret {
            return Err(ConfigError::InvalidValue(
                "access and refresh tokens must use different secrets".to_string(),
            ));
        }

        if settings.access_token_expiry <= 0 || settings.refresh_token_expiry <= 0 {
            return Err(ConfigError::InvalidValue(
                "token expiry must be positive".to_string(),
            ));
        }

        if settings.issuer.trim().is_empty() {
            return Err(ConfigError::MissingRequired("jwt.issuer".to_string()));
        }

        Ok(Self {
            access: SigningKeys::new(&settings.access_secret, settings.access_token_expiry),
            refresh: SigningKeys::new(&settings.refresh_secret, settings.refresh_token_expiry),
            issuer: settings.issuer.clone(),
        })
    }

    pub fn issue_access(&self, user_id: Uuid, email: &str) -> Result<IssuedToken, AppError> {
        self.issue(TokenType::Access, user_id, email, self.access.ttl)
    }

    pub fn issue_refresh(&self, user_id: Uuid, email: &str) -> Result<IssuedToken, AppError> {
        self.issue(TokenType::Refresh, user_id, email, self.refresh.ttl)
    }

    pub fn verify_access(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify(TokenType::Access, token)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify(TokenType::Refresh, token)
    }

    fn keys(&self, typ: TokenType) -> &SigningKeys {
        match typ {
            TokenType::Access => &self.access,
            TokenType::Refresh => &self.refresh,
        }
    }

    fn issue(
        &self,
        typ: TokenType,
        user_id: Uuid,
        email: &str,
        ttl: i64,
    ) -> Result<IssuedToken, AppError> {
        let claims = Claims::new(user_id, email.to_string(), typ, ttl, self.issuer.clone());

        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some(typ.as_str().to_string());

        let token = encode(&header, &claims, &self.keys(typ).encoding)
            .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))?;

        Ok(IssuedToken {
            token,
            expires_in: ttl,
            expires_at: claims.expires_at(),
        })
    }

    fn verify(&self, expected: TokenType, token: &str) -> Result<Claims, TokenError> {
        let header = decode_header(token).map_err(|_| TokenError::Malformed)?;
        match header.kid.as_deref() {
            Some(kid) if kid == expected.as_str() => {}
            Some("access") | Some("refresh") => return Err(TokenError::WrongType),
            _ => return Err(TokenError::Malformed),
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        validation.leeway = 0;

        let claims = decode::<Claims>(token, &self.keys(expected).decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                let reason = match e.kind() {
                    ErrorKind::ExpiredSignature => TokenError::Expired,
                    ErrorKind::InvalidSignature => TokenError::BadSignature,
                    _ => TokenError::Malformed,
                };
                tracing::debug!(token_type = expected.as_str(), error = %e, "JWT rejected");
                reason
            })?;

        // The header is unauthenticated; the signed claim is authoritative
        if claims.typ != expected {
            return Err(TokenError::WrongType);
        }
        claims.user_id()?;

        Ok(claims)
    }
}
