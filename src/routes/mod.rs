mod auth;
mod devices;
mod health_check;

pub use auth::{
    change_password, cleared_refresh_cookie, login, logout, refresh, refresh_cookie, register,
    request_details, validate, TokenResponse, REFRESH_COOKIE,
};
pub use devices::{get_device, last_used_device, list_devices, revoke_device, revoke_other_devices};
pub use health_check::health_check;
