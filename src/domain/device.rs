use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::RequestDetails;

/// One browser/client an account has authenticated from.
///
/// Holds at most one live refresh token, stored as its SHA-256 digest.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceTrustRecord {
    pub id: Uuid,
    pub account_id: Uuid,
    pub fingerprint: String,
    pub device_name: Option<String>,
    pub browser: Option<String>,
    pub os: Option<String>,
    pub ip: Option<String>,
    pub is_trusted: bool,
    pub refresh_token_hash: Option<String>,
    pub refresh_token_expires_at: Option<DateTime<Utc>>,
    pub last_used_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DeviceTrustRecord {
    pub fn new(
        account_id: Uuid,
        fingerprint: &str,
        refresh_token_hash: String,
        refresh_token_expires_at: DateTime<Utc>,
        details: &RequestDetails,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            account_id,
            fingerprint: fingerprint.to_string(),
            device_name: details.device_name(),
            browser: details.browser.clone(),
            os: details.os.clone(),
            ip: details.ip.clone(),
            is_trusted: true,
            refresh_token_hash: Some(refresh_token_hash),
            refresh_token_expires_at: Some(refresh_token_expires_at),
            last_used_at: now,
            created_at: now,
            updated_at: now,
        }
    }

    /// Trusted, holding a token, and that token's stored expiry is not past
    pub fn holds_live_token(&self, now: DateTime<Utc>) -> bool {
        if !self.is_trusted || self.refresh_token_hash.is_none() {
            return false;
        }
        match self.refresh_token_expires_at {
            Some(expires_at) => expires_at >= now,
            None => false,
        }
    }

    /// Replace the live token and re-trust the device
    pub fn rotate(
        &mut self,
        refresh_token_hash: String,
        refresh_token_expires_at: DateTime<Utc>,
        details: &RequestDetails,
    ) {
        let now = Utc::now();
        self.refresh_token_hash = Some(refresh_token_hash);
        self.refresh_token_expires_at = Some(refresh_token_expires_at);
        self.is_trusted = true;
        self.last_used_at = now;
        self.updated_at = now;
        self.merge_details(details);
    }

    /// Blank incoming values never erase what is already known
    pub fn merge_details(&mut self, details: &RequestDetails) {
        if let Some(name) = details.device_name() {
            self.device_name = Some(name);
        }
        if let Some(browser) = details.browser.as_ref().filter(|v| !v.is_empty()) {
            self.browser = Some(browser.clone());
        }
        if let Some(os) = details.os.as_ref().filter(|v| !v.is_empty()) {
            self.os = Some(os.clone());
        }
        if let Some(ip) = details.ip.as_ref().filter(|v| !v.is_empty()) {
            self.ip = Some(ip.clone());
        }
    }

    /// Soft revoke: the row stays for audit
    pub fn revoke(&mut self) {
        self.is_trusted = false;
        self.refresh_token_hash = None;
        self.refresh_token_expires_at = None;
        self.updated_at = Utc::now();
    }

    pub fn summary(&self) -> DeviceSummary {
        DeviceSummary {
            id: self.id,
            fingerprint: self.fingerprint.clone(),
            device_name: self.device_name.clone(),
            browser: self.browser.clone(),
            os: self.os.clone(),
            ip: self.ip.clone(),
            is_trusted: self.is_trusted,
            last_used_at: self.last_used_at,
            created_at: self.created_at,
        }
    }
}

/// Listing projection of a device record. Has no refresh token field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSummary {
    pub id: Uuid,
    #[serde(rename = "deviceId")]
    pub fingerprint: String,
    pub device_name: Option<String>,
    pub browser: Option<String>,
    pub os: Option<String>,
    pub ip: Option<String>,
    pub is_trusted: bool,
    pub last_used_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn details(browser: Option<&str>, os: Option<&str>, ip: Option<&str>) -> RequestDetails {
        RequestDetails {
            browser: browser.map(str::to_string),
            browser_version: browser.map(|_| "121.0".to_string()),
            os: os.map(str::to_string),
            ip: ip.map(str::to_string),
        }
    }

    fn record() -> DeviceTrustRecord {
        DeviceTrustRecord::new(
            Uuid::new_v4(),
            "fp-1",
            "digest".to_string(),
            Utc::now() + Duration::days(7),
            &details(Some("Firefox"), Some("Linux"), Some("10.0.0.1")),
        )
    }

    #[test]
    fn new_record_holds_live_token() {
        let device = record();
        assert!(device.holds_live_token(Utc::now()));
        assert_eq!(device.device_name.as_deref(), Some("Firefox 121 on Linux"));
    }

    #[test]
    fn merge_relabels_device_from_new_agent() {
        let mut device = record();
        device.merge_details(&details(Some("Chrome"), Some("Windows"), None));
        assert_eq!(device.device_name.as_deref(), Some("Chrome 121 on Windows"));

        device.merge_details(&RequestDetails::default());
        assert_eq!(device.device_name.as_deref(), Some("Chrome 121 on Windows"));
    }

    #[test]
    fn stored_expiry_in_the_past_is_not_live() {
        let mut device = record();
        device.refresh_token_expires_at = Some(Utc::now() - Duration::seconds(1));
        assert!(!device.holds_live_token(Utc::now()));
    }

    #[test]
    fn revoke_clears_token_and_trust() {
        let mut device = record();
        device.revoke();

        assert!(!device.is_trusted);
        assert!(device.refresh_token_hash.is_none());
        assert!(device.refresh_token_expires_at.is_none());
        assert!(!device.holds_live_token(Utc::now()));
    }

    #[test]
    fn blank_details_do_not_erase_known_values() {
        let mut device = record();
        device.merge_details(&details(Some(""), None, Some("10.0.0.2")));

        assert_eq!(device.browser.as_deref(), Some("Firefox"));
        assert_eq!(device.os.as_deref(), Some("Linux"));
        assert_eq!(device.ip.as_deref(), Some("10.0.0.2"));
        assert_eq!(device.device_name.as_deref(), Some("Firefox 121 on Linux"));
    }

    #[test]
    fn rotate_re_trusts_a_revoked_device() {
        let mut device = record();
        device.revoke();
        device.rotate(
            "next".to_string(),
            Utc::now() + Duration::days(7),
            &RequestDetails::default(),
        );

        assert!(device.is_trusted);
        assert_eq!(device.refresh_token_hash.as_deref(), Some("next"));
    }

    #[test]
    fn summary_json_has_no_token_field() {
        let json = serde_json::to_value(record().summary()).unwrap();
        let object = json.as_object().unwrap();

        assert!(object.keys().all(|key| !key.to_lowercase().contains("token")));
        assert_eq!(json["deviceId"], "fp-1");
    }
}
