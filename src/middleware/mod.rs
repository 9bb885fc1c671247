/// Middleware module
///
/// Access-token authentication and device fingerprint resolution.

mod device_id;
mod jwt_middleware;

pub use device_id::{
    cleared_device_cookie, device_cookie, DeviceFingerprint, DeviceIdMiddleware, DEVICE_COOKIE,
};
pub use jwt_middleware::{bearer_token, JwtMiddleware};
