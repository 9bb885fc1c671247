/// Account guard policies applied at every entry point.
///
/// Usability is derived from the stored flags: an account is `Unregistered`
/// until created, then `Active` or `Disabled`. Only `Active` accounts may
/// authenticate, whatever credentials or tokens they present.

use crate::domain::Account;
use crate::error::AuthError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountState {
    Unregistered,
    Active,
    Disabled,
}

impl AccountState {
    pub fn of(account: Option<&Account>) -> Self {
        match account {
            None => AccountState::Unregistered,
            Some(account) if account.is_active => AccountState::Active,
            Some(_) => AccountState::Disabled,
        }
    }
}

/// Hand back the account only if it may authenticate
pub fn require_usable(
    account: Option<Account>,
    require_verified_email: bool,
) -> Result<Account, AuthError> {
    match AccountState::of(account.as_ref()) {
        AccountState::Unregistered => Err(AuthError::AccountMissing),
        AccountState::Disabled => Err(AuthError::AccountDisabled),
        AccountState::Active => {
            let account = account.ok_or(AuthError::AccountMissing)?;
            if require_verified_email && !account.is_email_verified {
                return Err(AuthError::EmailUnverified);
            }
            Ok(account)
        }
    }
}
