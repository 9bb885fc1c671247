/// Authentication Routes
///
/// Registration, login, token refresh, logout, access-token validation and
/// password change. The refresh token travels in an HttpOnly cookie scoped to
/// `cookies.refresh_path` (default `/auth`, covering refresh and logout); it
/// only appears in JSON bodies when `auth.expose_refresh_token` is set.

use actix_web::cookie::{time::Duration, Cookie, SameSite};
use actix_web::http::{header, StatusCode};
use actix_web::{web, HttpRequest, HttpResponse, HttpResponseBuilder, ResponseError};
use serde::{Deserialize, Serialize};

use crate::auth::{AuthSession, Claims, CredentialService, LogoutOutcome, Registration};
use crate::configuration::CookieSettings;
use crate::domain::{Account, DeviceSummary, RequestDetails};
use crate::error::{AppError, AuthError, ErrorContext};
use crate::middleware::{cleared_device_cookie, device_cookie, DeviceFingerprint};

pub const REFRESH_COOKIE: &str = "refreshToken";

/// User registration request
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Body fallback for clients that cannot send the refresh cookie
#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub expires_in: i64,
    pub refresh_expires_in: i64,
    pub token_type: &'static str,
    pub user: Account,
    pub device: DeviceSummary,
}

impl TokenResponse {
    pub fn from_session(session: AuthSession, expose_refresh_token: bool) -> Self {
        Self {
            access_token: session.tokens.access_token,
            refresh_token: expose_refresh_token.then_some(session.tokens.refresh_token),
            expires_in: session.tokens.expires_in,
            refresh_expires_in: session.tokens.refresh_expires_in,
            token_type: session.tokens.token_type,
            user: session.account,
            device: session.device,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateResponse {
    pub valid: bool,
    pub user: Account,
}

/// Browser family, OS family and client address of the request
pub fn request_details(req: &HttpRequest) -> RequestDetails {
    let user_agent = req
        .headers()
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok());
    let connection = req.connection_info();

    RequestDetails::from_parts(user_agent, connection.realip_remote_addr())
}

pub fn refresh_cookie(settings: &CookieSettings, token: String, max_age_seconds: i64) -> Cookie<'static> {
    Cookie::build(REFRESH_COOKIE, token)
        .path(settings.refresh_path.clone())
        .http_only(true)
        .secure(settings.secure)
        .same_site(SameSite::Strict)
        .max_age(Duration::seconds(max_age_seconds))
        .finish()
}

pub fn cleared_refresh_cookie(settings: &CookieSettings) -> Cookie<'static> {
    Cookie::build(REFRESH_COOKIE, "")
        .path(settings.refresh_path.clone())
        .http_only(true)
        .secure(settings.secure)
        .same_site(SameSite::Strict)
        .max_age(Duration::ZERO)
        .finish()
}

fn session_response(
    mut builder: HttpResponseBuilder,
    session: AuthSession,
    service: &CredentialService,
    cookies: &CookieSettings,
) -> HttpResponse {
    builder.cookie(refresh_cookie(
        cookies,
        session.tokens.refresh_token.clone(),
        session.tokens.refresh_expires_in,
    ));
    builder.json(TokenResponse::from_session(
        session,
        service.policy().expose_refresh_token,
    ))
}

/// Refresh token from the cookie, falling back to the JSON body
fn presented_refresh_token(req: &HttpRequest, body: Option<web::Json<RefreshRequest>>) -> Option<String> {
    req.cookie(REFRESH_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .filter(|token| !token.is_empty())
        .or_else(|| body.and_then(|body| body.into_inner().refresh_token))
        .filter(|token| !token.is_empty())
}

/// POST /auth/register
///
/// # Errors
/// - 400: Validation errors (invalid email, name or weak password)
/// - 409: Email already registered
pub async fn register(
    req: HttpRequest,
    form: web::Json<RegisterRequest>,
    fingerprint: web::ReqData<DeviceFingerprint>,
    service: web::Data<CredentialService>,
    cookies: web::Data<CookieSettings>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("user_registration");
    let form = form.into_inner();

    let session = service
        .register(
            Registration {
                name: form.name,
                last_name: form.last_name,
                email: form.email,
                password: form.password,
            },
            &fingerprint.value,
            &request_details(&req),
        )
        .await
        .map_err(|e| context.record(e))?;

    tracing::info!(
        request_id = %context.request_id,
        user_id = %session.account.id,
        "User registered successfully"
    );

    Ok(session_response(HttpResponse::Created(), session, &service, &cookies))
}

/// POST /auth/login
///
/// Missing account, wrong password and disabled account are indistinguishable
/// 401 responses.
pub async fn login(
    req: HttpRequest,
    form: web::Json<LoginRequest>,
    fingerprint: web::ReqData<DeviceFingerprint>,
    service: web::Data<CredentialService>,
    cookies: web::Data<CookieSettings>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("user_login");

    let session = service
        .login(
            &form.email,
            &form.password,
            &fingerprint.value,
            &request_details(&req),
        )
        .await
        .map_err(|e| context.record(e))?;

    tracing::info!(
        request_id = %context.request_id,
        user_id = %session.account.id,
        "User logged in successfully"
    );

    Ok(session_response(HttpResponse::Ok(), session, &service, &cookies))
}

/// POST /auth/refresh
///
/// Rotates the refresh token bound to the caller's device. A token that was
/// already rotated is rejected, and a rejected refresh clears the cookie.
pub async fn refresh(
    req: HttpRequest,
    body: Option<web::Json<RefreshRequest>>,
    fingerprint: web::ReqData<DeviceFingerprint>,
    service: web::Data<CredentialService>,
    cookies: web::Data<CookieSettings>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("token_refresh");

    // A freshly minted fingerprint says nothing about the caller's device
    let presented_fingerprint = (!fingerprint.is_new).then(|| fingerprint.value.clone());

    let outcome = match presented_refresh_token(&req, body) {
        Some(presented) => {
            service
                .refresh(&presented, presented_fingerprint.as_deref(), &request_details(&req))
                .await
        }
        None => Err(AppError::unauthorized(AuthError::MissingToken)),
    };

    let session = match outcome {
        Ok(session) => session,
        Err(e) => {
            let e = context.record(e);
            if e.status_code() != StatusCode::UNAUTHORIZED {
                return Err(e);
            }
            let mut response = e.error_response();
            if let Err(err) = response.add_cookie(&cleared_refresh_cookie(&cookies)) {
                tracing::warn!(error = %err, "Failed to clear refresh cookie");
            }
            return Ok(response);
        }
    };

    tracing::info!(
        request_id = %context.request_id,
        user_id = %session.account.id,
        "Token refreshed successfully"
    );

    let mut builder = HttpResponse::Ok();
    if fingerprint.is_new {
        // Restore the device's own id in place of the minted one
        builder.cookie(device_cookie(&cookies, session.device.fingerprint.clone()));
    }

    Ok(session_response(builder, session, &service, &cookies))
}

/// POST /auth/logout
///
/// Always clears the refresh and device cookies. The bound device is revoked
/// only when `auth.revoke_device_on_logout` is set.
pub async fn logout(
    req: HttpRequest,
    body: Option<web::Json<RefreshRequest>>,
    service: web::Data<CredentialService>,
    cookies: web::Data<CookieSettings>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("user_logout");
    let presented = presented_refresh_token(&req, body);

    let outcome = service
        .logout(presented.as_deref())
        .await
        .map_err(|e| context.record(e))?;

    if let LogoutOutcome::DeviceRevoked(device_id) = outcome {
        tracing::info!(request_id = %context.request_id, device_id = %device_id, "Logged out and revoked device");
    }

    Ok(HttpResponse::Ok()
        .cookie(cleared_refresh_cookie(&cookies))
        .cookie(cleared_device_cookie(&cookies))
        .json(serde_json::json!({ "message": "Logged out" })))
}

/// GET /auth/validate
///
/// **Requires valid JWT access token** in Authorization header.
pub async fn validate(
    claims: web::ReqData<Claims>,
    service: web::Data<CredentialService>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("token_validation").with_user_id(&claims.sub);

    let user = service
        .current_account(&claims)
        .await
        .map_err(|e| context.record(e))?;

    Ok(HttpResponse::Ok().json(ValidateResponse { valid: true, user }))
}

/// POST /auth/password
///
/// **Requires valid JWT access token** in Authorization header.
pub async fn change_password(
    claims: web::ReqData<Claims>,
    form: web::Json<ChangePasswordRequest>,
    service: web::Data<CredentialService>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("password_change").with_user_id(&claims.sub);

    let account = service
        .current_account(&claims)
        .await
        .map_err(|e| context.record(e))?;

    service
        .change_password(account.id, &form.current_password, &form.new_password)
        .await
        .map_err(|e| context.record(e))?;

    Ok(HttpResponse::NoContent().finish())
}
