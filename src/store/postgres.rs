/// Postgres-backed stores
///
/// Tables are created by the SQL files in `migrations/`. Refresh tokens are
/// only ever stored as their SHA-256 digest.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Row};
use uuid::Uuid;

use crate::domain::{Account, AccountChanges, DeviceSummary, DeviceTrustRecord, NewAccount};
use crate::error::AppError;
use crate::store::{digest_refresh_token, AccountRepository, BindOutcome, BindRequest, DeviceStore};

const ACCOUNT_COLUMNS: &str = "id, name, last_name, email, password_hash, is_active, \
     is_email_verified, last_login_at, created_at, updated_at";

const DEVICE_COLUMNS: &str = "id, account_id, fingerprint, device_name, browser, os, ip, \
     is_trusted, refresh_token_hash, refresh_token_expires_at, last_used_at, created_at, updated_at";

#[derive(FromRow)]
struct AccountRow {
    id: Uuid,
    name: String,
    last_name: String,
    email: String,
    password_hash: String,
    is_active: bool,
    is_email_verified: bool,
    last_login_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl AccountRow {
    fn into_account(self, with_password: bool) -> Account {
        Account {
            id: self.id,
            name: self.name,
            last_name: self.last_name,
            email: self.email,
            password_hash: with_password.then_some(self.password_hash),
            is_active: self.is_active,
            is_email_verified: self.is_email_verified,
            last_login_at: self.last_login_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Clone)]
pub struct PgAccountRepository {
    pool: PgPool,
}

impl PgAccountRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountRepository for PgAccountRepository {
    async fn find_by_email(&self, email: &str, with_password: bool) -> Result<Option<Account>, AppError> {
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            "SELECT {} FROM users WHERE email = $1",
            ACCOUNT_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| row.into_account(with_password)))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>, AppError> {
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            "SELECT {} FROM users WHERE id = $1",
            ACCOUNT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| row.into_account(false)))
    }

    async fn create(&self, account: NewAccount) -> Result<Account, AppError> {
        let now = Utc::now();
        let result = sqlx::query_as::<_, AccountRow>(&format!(
            r#"
            INSERT INTO users (id, name, last_name, email, password_hash, is_active,
                               is_email_verified, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
            RETURNING {}
            "#,
            ACCOUNT_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(&account.name)
        .bind(&account.last_name)
        .bind(&account.email)
        .bind(&account.password_hash)
        .bind(account.is_active)
        .bind(account.is_email_verified)
        .bind(now)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(row) => Ok(row.into_account(false)),
            Err(e) => match AppError::from(e) {
                AppError::Conflict(_) => Err(AppError::Conflict(format!(
                    "An account with the email {} already exists",
                    account.email
                ))),
                other => Err(other),
            },
        }
    }

    async fn update(&self, id: Uuid, changes: AccountChanges) -> Result<Account, AppError> {
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            r#"
            UPDATE users
            SET password_hash = COALESCE($2, password_hash),
                is_active = COALESCE($3, is_active),
                is_email_verified = COALESCE($4, is_email_verified),
                last_login_at = COALESCE($5, last_login_at),
                updated_at = $6
            WHERE id = $1
            RETURNING {}
            "#,
            ACCOUNT_COLUMNS
        ))
        .bind(id)
        .bind(changes.password_hash)
        .bind(changes.is_active)
        .bind(changes.is_email_verified)
        .bind(changes.last_login_at)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| row.into_account(false))
            .ok_or_else(|| AppError::NotFound(format!("Account {} not found", id)))
    }

    async fn delete(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[derive(FromRow)]
struct DeviceRow {
    id: Uuid,
    account_id: Uuid,
    fingerprint: String,
    device_name: Option<String>,
    browser: Option<String>,
    os: Option<String>,
    ip: Option<String>,
    is_trusted: bool,
    refresh_token_hash: Option<String>,
    refresh_token_expires_at: Option<DateTime<Utc>>,
    last_used_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<DeviceRow> for DeviceTrustRecord {
    fn from(row: DeviceRow) -> Self {
        Self {
            id: row.id,
            account_id: row.account_id,
            fingerprint: row.fingerprint,
            device_name: row.device_name,
            browser: row.browser,
            os: row.os,
            ip: row.ip,
            is_trusted: row.is_trusted,
            refresh_token_hash: row.refresh_token_hash,
            refresh_token_expires_at: row.refresh_token_expires_at,
            last_used_at: row.last_used_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Clone)]
pub struct PgDeviceStore {
    pool: PgPool,
}

impl PgDeviceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DeviceStore for PgDeviceStore {
    async fn bind(&self, request: BindRequest) -> Result<BindOutcome, AppError> {
        let digest = digest_refresh_token(&request.refresh_token);
        let now = Utc::now();

        if let Some(rotation) = &request.replacing {
            // Compare-and-swap on the previous digest
            let rotated = sqlx::query_as::<_, DeviceRow>(&format!(
                r#"
                UPDATE trusted_devices
                SET refresh_token_hash = $1,
                    refresh_token_expires_at = $2,
                    is_trusted = true,
                    browser = COALESCE(NULLIF($3, ''), browser),
                    os = COALESCE(NULLIF($4, ''), os),
                    ip = COALESCE(NULLIF($5, ''), ip),
                    device_name = COALESCE($10, device_name),
                    last_used_at = $6,
                    updated_at = $6
                WHERE id = $7 AND account_id = $8 AND refresh_token_hash = $9 AND is_trusted = true
                RETURNING {}
                "#,
                DEVICE_COLUMNS
            ))
            .bind(&digest)
            .bind(request.refresh_expires_at)
            .bind(&request.details.browser)
            .bind(&request.details.os)
            .bind(&request.details.ip)
            .bind(now)
            .bind(rotation.device_id)
            .bind(request.account_id)
            .bind(digest_refresh_token(&rotation.previous_token))
            .bind(request.details.device_name())
            .fetch_optional(&self.pool)
            .await?;

            if let Some(row) = rotated {
                return Ok(BindOutcome::Updated(row.into()));
            }

            let still_there = sqlx::query(
                "SELECT 1 FROM trusted_devices WHERE id = $1 AND account_id = $2",
            )
            .bind(rotation.device_id)
            .bind(request.account_id)
            .fetch_optional(&self.pool)
            .await?;

            if still_there.is_some() {
                return Ok(BindOutcome::Superseded);
            }

            tracing::warn!(
                device_id = %rotation.device_id,
                user_id = %request.account_id,
                "Device to rotate not found, falling back to fingerprint"
            );
        }

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO trusted_devices
                (id, account_id, fingerprint, browser, os, ip, is_trusted,
                 refresh_token_hash, refresh_token_expires_at, last_used_at, created_at, updated_at,
                 device_name)
            VALUES ($1, $2, $3, NULLIF($4, ''), NULLIF($5, ''), NULLIF($6, ''), true, $7, $8, $9, $9, $9, $10)
            ON CONFLICT (account_id, fingerprint) DO UPDATE
            SET device_name = COALESCE(EXCLUDED.device_name, trusted_devices.device_name),
                browser = COALESCE(EXCLUDED.browser, trusted_devices.browser),
                os = COALESCE(EXCLUDED.os, trusted_devices.os),
                ip = COALESCE(EXCLUDED.ip, trusted_devices.ip),
                is_trusted = true,
                refresh_token_hash = EXCLUDED.refresh_token_hash,
                refresh_token_expires_at = EXCLUDED.refresh_token_expires_at,
                last_used_at = EXCLUDED.last_used_at,
                updated_at = EXCLUDED.updated_at
            RETURNING {}, (xmax = 0) AS inserted
            "#,
            DEVICE_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(request.account_id)
        .bind(&request.fingerprint)
        .bind(&request.details.browser)
        .bind(&request.details.os)
        .bind(&request.details.ip)
        .bind(&digest)
        .bind(request.refresh_expires_at)
        .bind(now)
        .bind(request.details.device_name())
        .fetch_one(&self.pool)
        .await?;

        let inserted: bool = row.try_get("inserted")?;
        let record = DeviceTrustRecord::from(DeviceRow::from_row(&row)?);

        Ok(if inserted {
            BindOutcome::Created(record)
        } else {
            BindOutcome::Updated(record)
        })
    }

    async fn find_by_refresh_token(&self, token: &str) -> Result<Option<DeviceTrustRecord>, AppError> {
        let row = sqlx::query_as::<_, DeviceRow>(&format!(
            "SELECT {} FROM trusted_devices WHERE refresh_token_hash = $1",
            DEVICE_COLUMNS
        ))
        .bind(digest_refresh_token(token))
        .fetch_optional(&self.pool)
        .await?;

        let device = match row {
            Some(row) => DeviceTrustRecord::from(row),
            None => {
                tracing::warn!("Refresh token is not bound to any device");
                return Ok(None);
            }
        };

        if !device.holds_live_token(Utc::now()) {
            tracing::warn!(device_id = %device.id, "Stored refresh token expired or untrusted");
            return Ok(None);
        }

        Ok(Some(device))
    }

    async fn find_by_id(&self, account_id: Uuid, device_id: Uuid) -> Result<Option<DeviceTrustRecord>, AppError> {
        let row = sqlx::query_as::<_, DeviceRow>(&format!(
            "SELECT {} FROM trusted_devices WHERE account_id = $1 AND id = $2",
            DEVICE_COLUMNS
        ))
        .bind(account_id)
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(DeviceTrustRecord::from))
    }

    async fn find_by_fingerprint(&self, account_id: Uuid, fingerprint: &str) -> Result<Option<DeviceTrustRecord>, AppError> {
        let row = sqlx::query_as::<_, DeviceRow>(&format!(
            "SELECT {} FROM trusted_devices WHERE account_id = $1 AND fingerprint = $2",
            DEVICE_COLUMNS
        ))
        .bind(account_id)
        .bind(fingerprint)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(DeviceTrustRecord::from))
    }

    async fn find_last_used(&self, account_id: Uuid) -> Result<Option<DeviceTrustRecord>, AppError> {
        let row = sqlx::query_as::<_, DeviceRow>(&format!(
            "SELECT {} FROM trusted_devices WHERE account_id = $1 ORDER BY last_used_at DESC LIMIT 1",
            DEVICE_COLUMNS
        ))
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(DeviceTrustRecord::from))
    }

    async fn revoke(&self, account_id: Uuid, device_id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE trusted_devices
            SET is_trusted = false, refresh_token_hash = NULL,
                refresh_token_expires_at = NULL, updated_at = $1
            WHERE id = $2 AND account_id = $3
            "#,
        )
        .bind(Utc::now())
        .bind(device_id)
        .bind(account_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn revoke_all_except(&self, account_id: Uuid, keep_device_id: Uuid) -> Result<Option<u64>, AppError> {
        let mut transaction = self.pool.begin().await?;

        let kept = sqlx::query("SELECT 1 FROM trusted_devices WHERE id = $1 AND account_id = $2")
            .bind(keep_device_id)
            .bind(account_id)
            .fetch_optional(&mut transaction)
            .await?;
        if kept.is_none() {
            return Ok(None);
        }

        let result = sqlx::query(
            r#"
            UPDATE trusted_devices
            SET is_trusted = false, refresh_token_hash = NULL,
                refresh_token_expires_at = NULL, updated_at = $1
            WHERE account_id = $2 AND id <> $3
            "#,
        )
        .bind(Utc::now())
        .bind(account_id)
        .bind(keep_device_id)
        .execute(&mut transaction)
        .await?;

        transaction.commit().await?;

        tracing::info!(
            user_id = %account_id,
            revoked = result.rows_affected(),
            "Revoked all other devices"
        );
        Ok(Some(result.rows_affected()))
    }

    async fn list_by_account(&self, account_id: Uuid) -> Result<Vec<DeviceSummary>, AppError> {
        let rows = sqlx::query_as::<_, DeviceRow>(&format!(
            "SELECT {} FROM trusted_devices WHERE account_id = $1 ORDER BY last_used_at DESC",
            DEVICE_COLUMNS
        ))
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| DeviceTrustRecord::from(row).summary())
            .collect())
    }
}
