/// Password Hashing and Verification
///
/// Argon2id with configurable cost. Hashes are PHC strings carrying their own
/// parameters, which is what lets `needs_rehash` detect outdated hashes.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{self, PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};

use crate::configuration::PasswordSettings;
use crate::error::{AppError, ConfigError};

#[derive(Clone)]
pub struct PasswordHasher {
    argon2: Argon2<'static>,
    params: Params,
}

impl PasswordHasher {
    /// # Errors
    /// Returns a config error if argon2 rejects the cost parameters
    pub fn new(settings: &PasswordSettings) -> Result<Self, ConfigError> {
        let params = Params::new(
            settings.memory_cost,
            settings.time_cost,
            settings.parallelism,
            Some(settings.output_length),
        )
        .map_err(|e| ConfigError::InvalidValue(format!("argon2 parameters: {}", e)))?;

        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params.clone()),
            params,
        })
    }

    /// Hash a password with a fresh random salt
    ///
    /// # Errors
    /// Hashing failures (e.g. allocation of the working memory) are internal errors.
    pub fn hash(&self, plaintext: &str) -> Result<String, AppError> {
        let salt = SaltString::generate(&mut OsRng);

        self.argon2
            .hash_password(plaintext.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
    }

    /// Verify a password against a stored PHC hash.
    ///
    /// A hash that does not parse verifies as `false`. A hash that parses but
    /// cannot be checked (unsupported algorithm or parameters) is an error.
    pub fn verify(&self, hash: &str, plaintext: &str) -> Result<bool, AppError> {
        let parsed = match PasswordHash::new(hash) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(error = %e, "Stored password hash is malformed");
                return Ok(false);
            }
        };

        match self.argon2.verify_password(plaintext.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(password_hash::Error::Password) => Ok(false),
            Err(e) => Err(AppError::Internal(format!(
                "Password verification failed: {}",
                e
            ))),
        }
    }

    /// True when the hash was produced with another algorithm, version, or cost
    pub fn needs_rehash(&self, hash: &str) -> Result<bool, AppError> {
        let parsed = PasswordHash::new(hash)
            .map_err(|e| AppError::Internal(format!("Unreadable password hash: {}", e)))?;

        if parsed.algorithm != Algorithm::Argon2id.ident() {
            return Ok(true);
        }

        if parsed.version != Some(Version::V0x13.into()) {
            return Ok(true);
        }

        let embedded = match Params::try_from(&parsed) {
            Ok(params) => params,
            Err(_) => return Ok(true),
        };

        let output_len = parsed.hash.map(|output| output.len());

        Ok(embedded.m_cost() != self.params.m_cost()
            || embedded.t_cost() != self.params.t_cost()
            || embedded.p_cost() != self.params.p_cost()
            || output_len != self.params.output_len())
    }
}
