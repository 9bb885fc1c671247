/// In-process stores backed by `tokio::sync::Mutex<HashMap<..>>`.
///
/// Each operation holds the lock for its whole read-modify-write, which gives
/// `bind` the same compare-and-swap guarantee as the conditional SQL update.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::{Account, AccountChanges, DeviceSummary, DeviceTrustRecord, NewAccount};
use crate::error::AppError;
use crate::store::{digest_refresh_token, AccountRepository, BindOutcome, BindRequest, DeviceStore};

#[derive(Default)]
pub struct InMemoryAccountRepository {
    accounts: Mutex<HashMap<Uuid, Account>>,
}

impl InMemoryAccountRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountRepository for InMemoryAccountRepository {
    async fn find_by_email(&self, email: &str, with_password: bool) -> Result<Option<Account>, AppError> {
        let accounts = self.accounts.lock().await;
        let found = accounts.values().find(|a| a.email == email).cloned();

        Ok(if with_password {
            found
        } else {
            found.map(Account::without_password)
        })
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>, AppError> {
        let accounts = self.accounts.lock().await;
        Ok(accounts.get(&id).cloned().map(Account::without_password))
    }

    async fn create(&self, new: NewAccount) -> Result<Account, AppError> {
        let mut accounts = self.accounts.lock().await;

        if accounts.values().any(|a| a.email == new.email) {
            return Err(AppError::Conflict(format!(
                "An account with the email {} already exists",
                new.email
            )));
        }

        let now = Utc::now();
        let account = Account {
            id: Uuid::new_v4(),
            name: new.name,
            last_name: new.last_name,
            email: new.email,
            password_hash: Some(new.password_hash),
            is_active: new.is_active,
            is_email_verified: new.is_email_verified,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        };
        accounts.insert(account.id, account.clone());

        Ok(account.without_password())
    }

    async fn update(&self, id: Uuid, changes: AccountChanges) -> Result<Account, AppError> {
        let mut accounts = self.accounts.lock().await;
        let account = accounts
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Account {} not found", id)))?;

        changes.apply_to(account);
        Ok(account.clone().without_password())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, AppError> {
        Ok(self.accounts.lock().await.remove(&id).is_some())
    }
}

#[derive(Default)]
pub struct InMemoryDeviceStore {
    devices: Mutex<HashMap<Uuid, DeviceTrustRecord>>,
}

impl InMemoryDeviceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeviceStore for InMemoryDeviceStore {
    async fn bind(&self, request: BindRequest) -> Result<BindOutcome, AppError> {
        let digest = digest_refresh_token(&request.refresh_token);
        let mut devices = self.devices.lock().await;

        if let Some(rotation) = &request.replacing {
            let existing = devices
                .get_mut(&rotation.device_id)
                .filter(|device| device.account_id == request.account_id);

            match existing {
                Some(device) => {
                    let expected = digest_refresh_token(&rotation.previous_token);
                    if !device.is_trusted
                        || device.refresh_token_hash.as_deref() != Some(expected.as_str())
                    {
                        return Ok(BindOutcome::Superseded);
                    }
                    device.rotate(digest, request.refresh_expires_at, &request.details);
                    return Ok(BindOutcome::Updated(device.clone()));
                }
                None => {
                    tracing::warn!(
                        device_id = %rotation.device_id,
                        user_id = %request.account_id,
                        "Device to rotate not found, falling back to fingerprint"
                    );
                }
            }
        }

        if let Some(device) = devices.values_mut().find(|device| {
            device.account_id == request.account_id && device.fingerprint == request.fingerprint
        }) {
            device.rotate(digest, request.refresh_expires_at, &request.details);
            return Ok(BindOutcome::Updated(device.clone()));
        }

        let device = DeviceTrustRecord::new(
            request.account_id,
            &request.fingerprint,
            digest,
            request.refresh_expires_at,
            &request.details,
        );
        devices.insert(device.id, device.clone());

        Ok(BindOutcome::Created(device))
    }

    async fn find_by_refresh_token(&self, token: &str) -> Result<Option<DeviceTrustRecord>, AppError> {
        let digest = digest_refresh_token(token);
        let devices = self.devices.lock().await;

        let device = match devices
            .values()
            .find(|device| device.refresh_token_hash.as_deref() == Some(digest.as_str()))
        {
            Some(device) => device,
            None => {
                tracing::warn!("Refresh token is not bound to any device");
                return Ok(None);
            }
        };

        if !device.holds_live_token(Utc::now()) {
            tracing::warn!(device_id = %device.id, "Stored refresh token expired or untrusted");
            return Ok(None);
        }

        Ok(Some(device.clone()))
    }

    async fn find_by_id(&self, account_id: Uuid, device_id: Uuid) -> Result<Option<DeviceTrustRecord>, AppError> {
        let devices = self.devices.lock().await;
        Ok(devices
            .get(&device_id)
            .filter(|device| device.account_id == account_id)
            .cloned())
    }

    async fn find_by_fingerprint(&self, account_id: Uuid, fingerprint: &str) -> Result<Option<DeviceTrustRecord>, AppError> {
        let devices = self.devices.lock().await;
        Ok(devices
            .values()
            .find(|device| device.account_id == account_id && device.fingerprint == fingerprint)
            .cloned())
    }

    async fn find_last_used(&self, account_id: Uuid) -> Result<Option<DeviceTrustRecord>, AppError> {
        let devices = self.devices.lock().await;
        Ok(devices
            .values()
            .filter(|device| device.account_id == account_id)
            .max_by_key(|device| device.last_used_at)
            .cloned())
    }

    async fn revoke(&self, account_id: Uuid, device_id: Uuid) -> Result<bool, AppError> {
        let mut devices = self.devices.lock().await;
        match devices
            .get_mut(&device_id)
            .filter(|device| device.account_id == account_id)
        {
            Some(device) => {
                device.revoke();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn revoke_all_except(&self, account_id: Uuid, keep_device_id: Uuid) -> Result<Option<u64>, AppError> {
        let mut devices = self.devices.lock().await;

        let keeps_own_device = devices
            .get(&keep_device_id)
            .map(|device| device.account_id == account_id)
            .unwrap_or(false);
        if !keeps_own_device {
            return Ok(None);
        }

        let mut revoked = 0;
        for device in devices.values_mut().filter(|device| {
            device.account_id == account_id && device.id != keep_device_id
        }) {
            device.revoke();
            revoked += 1;
        }

        Ok(Some(revoked))
    }

    async fn list_by_account(&self, account_id: Uuid) -> Result<Vec<DeviceSummary>, AppError> {
        let devices = self.devices.lock().await;
        let mut owned: Vec<&DeviceTrustRecord> = devices
            .values()
            .filter(|device| device.account_id == account_id)
            .collect();
        owned.sort_by(|a, b| b.last_used_at.cmp(&a.last_used_at));

        Ok(owned.into_iter().map(DeviceTrustRecord::summary).collect())
    }
}
