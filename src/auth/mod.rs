/// Authentication module
///
/// Token codec, password hashing, account guard policies and the credential
/// service that ties them to the stores.

mod claims;
mod guard;
mod jwt;
mod password;
mod service;

pub use claims::{Claims, TokenType};
pub use guard::{require_usable, AccountState};
pub use jwt::{IssuedToken, TokenCodec};
pub use password::PasswordHasher;
pub use service::{
    AuthSession, CredentialService, LogoutOutcome, Registration, RevokedOthers, TokenPair,
};
