/// Persistence seams for the credential service.
///
/// `AccountRepository` is the account collaborator; `DeviceStore` exclusively
/// owns device trust records. "Nothing found" is an `Option` at this layer and
/// only becomes a typed failure in the service.

mod memory;
mod postgres;

pub use memory::{InMemoryAccountRepository, InMemoryDeviceStore};
pub use postgres::{PgAccountRepository, PgDeviceStore};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::domain::{Account, AccountChanges, DeviceSummary, DeviceTrustRecord, NewAccount, RequestDetails};
use crate::error::AppError;

#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// `with_password` widens the read to include the password hash
    async fn find_by_email(&self, email: &str, with_password: bool) -> Result<Option<Account>, AppError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>, AppError>;

    /// # Errors
    /// `AppError::Conflict` when the email is already registered
    async fn create(&self, account: NewAccount) -> Result<Account, AppError>;

    /// # Errors
    /// `AppError::NotFound` when no account has this id
    async fn update(&self, id: Uuid, changes: AccountChanges) -> Result<Account, AppError>;

    /// Hard delete. Returns false when no account has this id.
    async fn delete(&self, id: Uuid) -> Result<bool, AppError>;
}

/// Refresh-rotation precondition: the device being refreshed and the token
/// it must still hold
#[derive(Debug, Clone)]
pub struct Rotation {
    pub device_id: Uuid,
    pub previous_token: String,
}

#[derive(Debug, Clone)]
pub struct BindRequest {
    pub account_id: Uuid,
    pub fingerprint: String,
    pub refresh_token: String,
    pub refresh_expires_at: DateTime<Utc>,
    pub details: RequestDetails,
    pub replacing: Option<Rotation>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BindOutcome {
    Created(DeviceTrustRecord),
    Updated(DeviceTrustRecord),
    /// The device exists but no longer holds `Rotation::previous_token`
    /// (already rotated or revoked); nothing was written
    Superseded,
}

impl BindOutcome {
    pub fn into_record(self) -> Option<DeviceTrustRecord> {
        match self {
            BindOutcome::Created(record) | BindOutcome::Updated(record) => Some(record),
            BindOutcome::Superseded => None,
        }
    }
}

#[async_trait]
pub trait DeviceStore: Send + Sync {
    /// Bind a freshly issued refresh token to a device.
    ///
    /// Resolution order: the rotation's device id (conditional on the previous
    /// token), then (account, fingerprint), then a new record.
    async fn bind(&self, request: BindRequest) -> Result<BindOutcome, AppError>;

    /// Record currently holding `token`, if trusted and not past its stored expiry
    async fn find_by_refresh_token(&self, token: &str) -> Result<Option<DeviceTrustRecord>, AppError>;

    async fn find_by_id(&self, account_id: Uuid, device_id: Uuid) -> Result<Option<DeviceTrustRecord>, AppError>;

    async fn find_by_fingerprint(&self, account_id: Uuid, fingerprint: &str) -> Result<Option<DeviceTrustRecord>, AppError>;

    async fn find_last_used(&self, account_id: Uuid) -> Result<Option<DeviceTrustRecord>, AppError>;

    /// Soft revoke one device. Returns false when it does not belong to the account.
    async fn revoke(&self, account_id: Uuid, device_id: Uuid) -> Result<bool, AppError>;

    /// Soft revoke every device of the account except `keep_device_id`.
    /// Returns `None` when the kept device does not belong to the account.
    async fn revoke_all_except(&self, account_id: Uuid, keep_device_id: Uuid) -> Result<Option<u64>, AppError>;

    /// Devices ordered by last use, most recent first
    async fn list_by_account(&self, account_id: Uuid) -> Result<Vec<DeviceSummary>, AppError>;
}

/// SHA-256 hex digest under which a refresh token is stored
pub(crate) fn digest_refresh_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_digest_is_stable_hex() {
        let first = digest_refresh_token("eyJ.refresh.token");
        let second = digest_refresh_token("eyJ.refresh.token");

        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_different_tokens_different_digests() {
        assert_ne!(digest_refresh_token("a"), digest_refresh_token("b"));
    }

    #[test]
    fn test_superseded_has_no_record() {
        assert!(BindOutcome::Superseded.into_record().is_none());
    }
}
