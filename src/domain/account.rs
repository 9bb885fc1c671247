use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Identity record owned by the account repository.
///
/// `password_hash` is only populated by `find_by_email(.., with_password: true)`
/// and is never serialized.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: Uuid,
    pub name: String,
    pub last_name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub is_active: bool,
    pub is_email_verified: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Copy without the password hash, as returned by ordinary reads
    pub fn without_password(mut self) -> Self {
        self.password_hash = None;
        self
    }
}

#[derive(Debug, Clone)]
pub struct NewAccount {
    pub name: String,
    pub last_name: String,
    pub email: String,
    pub password_hash: String,
    pub is_active: bool,
    pub is_email_verified: bool,
}

/// Partial update: `None` leaves the field untouched
#[derive(Debug, Clone, Default)]
pub struct AccountChanges {
    pub password_hash: Option<String>,
    pub is_active: Option<bool>,
    pub is_email_verified: Option<bool>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl AccountChanges {
    pub fn last_login(at: DateTime<Utc>) -> Self {
        Self {
            last_login_at: Some(at),
            ..Self::default()
        }
    }

    pub fn password(hash: String) -> Self {
        Self {
            password_hash: Some(hash),
            ..Self::default()
        }
    }

    pub fn active(is_active: bool) -> Self {
        Self {
            is_active: Some(is_active),
            ..Self::default()
        }
    }

    pub fn apply_to(&self, account: &mut Account) {
        if let Some(hash) = &self.password_hash {
            account.password_hash = Some(hash.clone());
        }
        if let Some(is_active) = self.is_active {
            account.is_active = is_active;
        }
        if let Some(verified) = self.is_email_verified {
            account.is_email_verified = verified;
        }
        if let Some(at) = self.last_login_at {
            account.last_login_at = Some(at);
        }
        account.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account() -> Account {
        Account {
            id: Uuid::new_v4(),
            name: "John".to_string(),
            last_name: "Doe".to_string(),
            email: "john@example.com".to_string(),
            password_hash: Some("$argon2id$v=19$...".to_string()),
            is_active: true,
            is_email_verified: true,
            last_login_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn password_hash_is_never_serialized() {
        let json = serde_json::to_value(account()).unwrap();
        assert!(json.get("passwordHash").is_none());
        assert_eq!(json["email"], "john@example.com");
        assert_eq!(json["lastName"], "Doe");
    }

    #[test]
    fn changes_only_touch_set_fields() {
        let mut target = account();
        AccountChanges::active(false).apply_to(&mut target);

        assert!(!target.is_active);
        assert!(target.is_email_verified);
        assert!(target.password_hash.is_some());
    }
}
