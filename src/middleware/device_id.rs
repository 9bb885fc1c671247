/// Device Fingerprint Middleware
///
/// Resolves the caller's device fingerprint from the `deviceId` cookie, or
/// mints a random UUID when the cookie is missing. The fingerprint is injected
/// into request extensions; a freshly minted one is also set as a cookie on
/// the response, unless the handler already set `deviceId` itself.

use actix_web::{
    cookie::{time::Duration, Cookie},
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpMessage,
};
use futures::future::LocalBoxFuture;
use std::rc::Rc;
use uuid::Uuid;

use crate::configuration::CookieSettings;

pub const DEVICE_COOKIE: &str = "deviceId";

const MAX_FINGERPRINT_LENGTH: usize = 128;

/// Fingerprint of the device making the current request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceFingerprint {
    pub value: String,
    /// Minted for this request, i.e. the client did not send one
    pub is_new: bool,
}

impl DeviceFingerprint {
    pub fn resolve(cookie_value: Option<&str>) -> Self {
        match cookie_value
            .map(str::trim)
            .filter(|v| !v.is_empty() && v.len() <= MAX_FINGERPRINT_LENGTH)
        {
            Some(value) => Self {
                value: value.to_string(),
                is_new: false,
            },
            None => Self {
                value: Uuid::new_v4().to_string(),
                is_new: true,
            },
        }
    }
}

pub fn device_cookie(settings: &CookieSettings, fingerprint: String) -> Cookie<'static> {
    Cookie::build(DEVICE_COOKIE, fingerprint)
        .path("/")
        .http_only(true)
        .secure(settings.secure)
        .max_age(Duration::days(settings.device_max_age_days))
        .finish()
}

pub fn cleared_device_cookie(settings: &CookieSettings) -> Cookie<'static> {
    Cookie::build(DEVICE_COOKIE, "")
        .path("/")
        .http_only(true)
        .secure(settings.secure)
        .max_age(Duration::ZERO)
        .finish()
}

pub struct DeviceIdMiddleware {
    settings: CookieSettings,
}

impl DeviceIdMiddleware {
    pub fn new(settings: CookieSettings) -> Self {
        Self { settings }
    }
}

impl<S, B> Transform<S, ServiceRequest> for DeviceIdMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = DeviceIdMiddlewareService<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(DeviceIdMiddlewareService {
            service: Rc::new(service),
            settings: self.settings.clone(),
        }))
    }
}

pub struct DeviceIdMiddlewareService<S> {
    service: Rc<S>,
    settings: CookieSettings,
}

impl<S, B> Service<ServiceRequest> for DeviceIdMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let fingerprint = DeviceFingerprint::resolve(
            req.cookie(DEVICE_COOKIE).as_ref().map(|c| c.value()),
        );
        req.extensions_mut().insert(fingerprint.clone());

        let service = self.service.clone();
        let settings = self.settings.clone();

        Box::pin(async move {
            let mut res = service.call(req).await?;

            let handler_set_cookie = res
                .response()
                .cookies()
                .any(|cookie| cookie.name() == DEVICE_COOKIE);

            if fingerprint.is_new && !handler_set_cookie {
                let cookie = device_cookie(&settings, fingerprint.value);

                if let Err(e) = res.response_mut().add_cookie(&cookie) {
                    tracing::warn!(error = %e, "Failed to set device cookie");
                }
            }

            Ok(res)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn existing_cookie_is_kept() {
        let fingerprint = DeviceFingerprint::resolve(Some("abc-123"));

        assert_eq!(fingerprint.value, "abc-123");
        assert!(!fingerprint.is_new);
    }

    #[test]
    fn missing_or_blank_cookie_mints_uuid() {
        for value in [None, Some(""), Some("   ")] {
            let fingerprint = DeviceFingerprint::resolve(value);
            assert!(fingerprint.is_new);
            assert!(Uuid::parse_str(&fingerprint.value).is_ok());
        }
    }

    #[test]
    fn cleared_cookie_is_site_wide_and_expired() {
        let cookie = cleared_device_cookie(&CookieSettings::default());

        assert_eq!(cookie.name(), DEVICE_COOKIE);
        assert_eq!(cookie.value(), "");
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.max_age(), Some(Duration::ZERO));
    }

    #[test]
    fn oversized_cookie_is_replaced() {
        let huge = "x".repeat(MAX_FINGERPRINT_LENGTH + 1);
        assert!(DeviceFingerprint::resolve(Some(&huge)).is_new);
    }
}
