mod account;
mod device;
mod request_details;

pub use account::{Account, AccountChanges, NewAccount};
pub use device::{DeviceSummary, DeviceTrustRecord};
pub use request_details::RequestDetails;
