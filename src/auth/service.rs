/// Credential Service
///
/// Orchestrates registration, login, refresh and logout on top of the account
/// repository and the device store. Every token pair is issued through
/// `issue_and_bind`, so a refresh token is never handed out unless its digest
/// is bound to a trusted device.
///
/// Failures of credential checks are all `AppError::Auth(..)`; the variant is
/// for logs only and clients see one generic 401.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::auth::claims::Claims;
use crate::auth::guard::require_usable;
use crate::auth::jwt::TokenCodec;
use crate::auth::password::PasswordHasher;
use crate::configuration::{AuthSettings, Settings};
use crate::domain::{Account, AccountChanges, DeviceSummary, NewAccount, RequestDetails};
use crate::error::{AppError, AuthError, TokenError};
use crate::store::{AccountRepository, BindOutcome, BindRequest, DeviceStore, Rotation};
use crate::validators::{is_present_password, is_valid_email, is_valid_name, is_valid_password};

/// Unvalidated registration input
#[derive(Debug, Clone)]
pub struct Registration {
    pub name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
    pub refresh_expires_in: i64,
    pub token_type: &'static str,
}

/// Result of a successful register, login or refresh
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub account: Account,
    pub device: DeviceSummary,
    pub tokens: TokenPair,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogoutOutcome {
    DeviceRevoked(Uuid),
    /// Only the client-side session is cleared
    SessionCleared,
}

#[derive(Debug, Clone)]
pub struct RevokedOthers {
    pub kept: DeviceSummary,
    pub revoked: u64,
}

#[derive(Clone)]
pub struct CredentialService {
    accounts: Arc<dyn AccountRepository>,
    devices: Arc<dyn DeviceStore>,
    hasher: PasswordHasher,
    codec: TokenCodec,
    policy: AuthSettings,
}

impl CredentialService {
    pub fn new(
        accounts: Arc<dyn AccountRepository>,
        devices: Arc<dyn DeviceStore>,
        hasher: PasswordHasher,
        codec: TokenCodec,
        policy: AuthSettings,
    ) -> Self {
        Self {
            accounts,
            devices,
            hasher,
            codec,
            policy,
        }
    }

    /// # Errors
    /// Returns a config error when the JWT or password settings are unusable
    pub fn from_settings(
        settings: &Settings,
        accounts: Arc<dyn AccountRepository>,
        devices: Arc<dyn DeviceStore>,
    ) -> Result<Self, AppError> {
        let hasher = PasswordHasher::new(&settings.password)?;
        let codec = TokenCodec::new(&settings.jwt)?;

        Ok(Self::new(accounts, devices, hasher, codec, settings.auth.clone()))
    }

    pub fn policy(&self) -> &AuthSettings {
        &self.policy
    }

    pub fn verify_access(&self, token: &str) -> Result<Claims, TokenError> {
        self.codec.verify_access(token)
    }

    pub async fn register(
        &self,
        registration: Registration,
        fingerprint: &str,
        details: &RequestDetails,
    ) -> Result<AuthSession, AppError> {
        let name = is_valid_name("name", &registration.name)?;
        let last_name = is_valid_name("lastName", &registration.last_name)?;
        let email = is_valid_email(&registration.email)?;
        is_valid_password(&registration.password)?;

        let password_hash = self.hash_password(registration.password).await?;

        let account = self
            .accounts
            .create(NewAccount {
                name,
                last_name,
                email,
                password_hash,
                is_active: true,
                is_email_verified: self.policy.auto_verify_email,
            })
            .await?;

        let account_id = account.id;
        let session = match self.issue_and_bind(account, fingerprint, details, None).await {
            Ok(session) => session,
            Err(e) => {
                // Roll back so the email stays free to register
                match self.accounts.delete(account_id).await {
                    Ok(_) => tracing::warn!(user_id = %account_id, "Registration rolled back"),
                    Err(cleanup) => tracing::error!(
                        user_id = %account_id,
                        error = %cleanup,
                        "Failed to roll back registration"
                    ),
                }
                return Err(e);
            }
        };

        tracing::info!(
            user_id = %session.account.id,
            device_id = %session.device.id,
            "Account registered"
        );
        Ok(session)
    }

    pub async fn login(
        &self,
        email: &str,
        password: &str,
        fingerprint: &str,
        details: &RequestDetails,
    ) -> Result<AuthSession, AppError> {
        let email = is_valid_email(email)?;
        is_present_password(password)?;

        let account = self
            .accounts
            .find_by_email(&email, true)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;
        let stored_hash = account
            .password_hash
            .clone()
            .ok_or(AuthError::InvalidCredentials)?;

        if !self
            .verify_password(stored_hash.clone(), password.to_string())
            .await?
        {
            return Err(AuthError::InvalidCredentials.into());
        }

        let account = require_usable(Some(account), self.policy.require_verified_email)?;
        let mut session = self.issue_and_bind(account, fingerprint, details, None).await?;

        let mut changes = AccountChanges::last_login(Utc::now());
        if self.hasher.needs_rehash(&stored_hash)? {
            changes.password_hash = Some(self.hash_password(password.to_string()).await?);
            tracing::info!(user_id = %session.account.id, "Password hash upgraded");
        }
        session.account = self.accounts.update(session.account.id, changes).await?;

        tracing::info!(
            user_id = %session.account.id,
            device_id = %session.device.id,
            "Login succeeded"
        );
        Ok(session)
    }

    /// Exchange a refresh token for a new pair, rotating the device's token.
    ///
    /// A presented fingerprint must match the device the token is bound to;
    /// without one the device's own fingerprint is used.
    pub async fn refresh(
        &self,
        presented: &str,
        fingerprint: Option<&str>,
        details: &RequestDetails,
    ) -> Result<AuthSession, AppError> {
        let claims = self.codec.verify_refresh(presented)?;
        let account_id = claims.user_id()?;

        let device = self
            .devices
            .find_by_refresh_token(presented)
            .await?
            .ok_or(AuthError::DeviceNotRecognized)?;

        if device.account_id != account_id {
            tracing::warn!(
                user_id = %account_id,
                device_id = %device.id,
                "Refresh token subject does not own its device"
            );
            return Err(AuthError::DeviceMismatch.into());
        }

        if let Some(fingerprint) = fingerprint {
            if fingerprint != device.fingerprint {
                tracing::warn!(
                    user_id = %account_id,
                    device_id = %device.id,
                    "Refresh presented from a different device"
                );
                return Err(AuthError::DeviceMismatch.into());
            }
        }

        let account = require_usable(
            self.accounts.find_by_id(account_id).await?,
            self.policy.require_verified_email,
        )?;

        let rotation = Rotation {
            device_id: device.id,
            previous_token: presented.to_string(),
        };
        let session = self
            .issue_and_bind(account, &device.fingerprint, details, Some(rotation))
            .await?;

        tracing::info!(user_id = %account_id, device_id = %device.id, "Tokens refreshed");
        Ok(session)
    }

    /// Never fails on a bad or missing token: logging out is always possible
    pub async fn logout(&self, presented: Option<&str>) -> Result<LogoutOutcome, AppError> {
        if !self.policy.revoke_device_on_logout {
            return Ok(LogoutOutcome::SessionCleared);
        }

        let token = match presented {
            Some(token) if !token.is_empty() => token,
            _ => return Ok(LogoutOutcome::SessionCleared),
        };

        let device = match self.devices.find_by_refresh_token(token).await? {
            Some(device) => device,
            None => return Ok(LogoutOutcome::SessionCleared),
        };

        self.devices.revoke(device.account_id, device.id).await?;
        tracing::info!(user_id = %device.account_id, device_id = %device.id, "Device revoked on logout");

        Ok(LogoutOutcome::DeviceRevoked(device.id))
    }

    /// Verify an access token and load its usable account
    pub async fn authenticate(&self, access_token: &str) -> Result<Account, AppError> {
        let claims = self.codec.verify_access(access_token)?;
        self.current_account(&claims).await
    }

    pub async fn current_account(&self, claims: &Claims) -> Result<Account, AppError> {
        let account = self.accounts.find_by_id(claims.user_id()?).await?;
        Ok(require_usable(account, self.policy.require_verified_email)?)
    }

    pub async fn list_devices(&self, account_id: Uuid) -> Result<Vec<DeviceSummary>, AppError> {
        self.devices.list_by_account(account_id).await
    }

    pub async fn last_used_device(&self, account_id: Uuid) -> Result<DeviceSummary, AppError> {
        self.devices
            .find_last_used(account_id)
            .await?
            .map(|device| device.summary())
            .ok_or_else(|| AppError::NotFound("No devices for this account".to_string()))
    }

    pub async fn find_device(&self, account_id: Uuid, device_id: Uuid) -> Result<DeviceSummary, AppError> {
        self.devices
            .find_by_id(account_id, device_id)
            .await?
            .map(|device| device.summary())
            .ok_or_else(|| AppError::NotFound(format!("Device {} not found", device_id)))
    }

    pub async fn revoke_device(&self, account_id: Uuid, device_id: Uuid) -> Result<(), AppError> {
        if !self.devices.revoke(account_id, device_id).await? {
            return Err(AppError::NotFound(format!("Device {} not found", device_id)));
        }

        tracing::info!(user_id = %account_id, device_id = %device_id, "Device revoked");
        Ok(())
    }

    /// Revoke every device except the caller's.
    ///
    /// The caller's device is the one matching `fingerprint`, falling back to
    /// the most recently used device.
    pub async fn revoke_all_except_current(
        &self,
        account_id: Uuid,
        fingerprint: Option<&str>,
    ) -> Result<RevokedOthers, AppError> {
        let by_fingerprint = match fingerprint {
            Some(fingerprint) => self.devices.find_by_fingerprint(account_id, fingerprint).await?,
            None => None,
        };
        let current = match by_fingerprint {
            Some(device) => Some(device),
            None => self.devices.find_last_used(account_id).await?,
        }
        .ok_or_else(|| AppError::NotFound("No current device".to_string()))?;

        let revoked = self
            .devices
            .revoke_all_except(account_id, current.id)
            .await?
            .ok_or_else(|| AppError::NotFound("No current device".to_string()))?;

        tracing::info!(
            user_id = %account_id,
            device_id = %current.id,
            revoked,
            "Revoked all other devices"
        );
        Ok(RevokedOthers {
            kept: current.summary(),
            revoked,
        })
    }

    pub async fn change_password(
        &self,
        account_id: Uuid,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), AppError> {
        is_present_password(current_password)?;
        is_valid_password(new_password)?;

        let account = require_usable(
            self.accounts.find_by_id(account_id).await?,
            self.policy.require_verified_email,
        )?;
        let stored_hash = self
            .accounts
            .find_by_email(&account.email, true)
            .await?
            .and_then(|account| account.password_hash)
            .ok_or(AuthError::InvalidCredentials)?;

        if !self
            .verify_password(stored_hash, current_password.to_string())
            .await?
        {
            return Err(AuthError::InvalidCredentials.into());
        }

        let new_hash = self.hash_password(new_password.to_string()).await?;
        self.accounts
            .update(account_id, AccountChanges::password(new_hash))
            .await?;

        tracing::info!(user_id = %account_id, "Password changed");
        Ok(())
    }

    pub async fn set_account_active(&self, account_id: Uuid, active: bool) -> Result<Account, AppError> {
        let account = self
            .accounts
            .update(account_id, AccountChanges::active(active))
            .await?;

        tracing::info!(user_id = %account_id, active, "Account activation changed");
        Ok(account)
    }

    pub async fn mark_email_verified(&self, account_id: Uuid) -> Result<Account, AppError> {
        let changes = AccountChanges {
            is_email_verified: Some(true),
            ..AccountChanges::default()
        };
        self.accounts.update(account_id, changes).await
    }

    /// Sign a fresh pair and bind the refresh token to the device.
    ///
    /// Nothing is returned unless the bind succeeded.
    async fn issue_and_bind(
        &self,
        account: Account,
        fingerprint: &str,
        details: &RequestDetails,
        replacing: Option<Rotation>,
    ) -> Result<AuthSession, AppError> {
        let access = self.codec.issue_access(account.id, &account.email)?;
        let refresh = self.codec.issue_refresh(account.id, &account.email)?;

        let outcome = self
            .devices
            .bind(BindRequest {
                account_id: account.id,
                fingerprint: fingerprint.to_string(),
                refresh_token: refresh.token.clone(),
                refresh_expires_at: refresh.expires_at,
                details: details.clone(),
                replacing,
            })
            .await?;

        let device = match outcome {
            BindOutcome::Created(device) => {
                tracing::info!(user_id = %account.id, device_id = %device.id, "New device trusted");
                device
            }
            BindOutcome::Updated(device) => device,
            BindOutcome::Superseded => {
                tracing::warn!(user_id = %account.id, "Refresh token was already rotated");
                return Err(AuthError::TokenReused.into());
            }
        };

        Ok(AuthSession {
            account,
            device: device.summary(),
            tokens: TokenPair {
                access_token: access.token,
                refresh_token: refresh.token,
                expires_in: access.expires_in,
                refresh_expires_in: refresh.expires_in,
                token_type: "Bearer",
            },
        })
    }

    // Argon2 blocks for tens of milliseconds; run it off the async workers
    async fn hash_password(&self, plaintext: String) -> Result<String, AppError> {
        let hasher = self.hasher.clone();
        tokio::task::spawn_blocking(move || hasher.hash(&plaintext)).await?
    }

    async fn verify_password(&self, hash: String, plaintext: String) -> Result<bool, AppError> {
        let hasher = self.hasher.clone();
        tokio::task::spawn_blocking(move || hasher.verify(&hash, &plaintext)).await?
    }
}
