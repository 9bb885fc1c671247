/// Device Routes
///
/// Listing and revocation of the authenticated account's trusted devices.
/// All handlers sit behind `JwtMiddleware`.

use actix_web::{web, HttpResponse};
use serde::Serialize;
use uuid::Uuid;

use crate::auth::{Claims, CredentialService};
use crate::error::{AppError, ErrorContext};
use crate::middleware::DeviceFingerprint;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokeOthersResponse {
    pub kept_device_id: Uuid,
    pub revoked: u64,
}

/// GET /devices
pub async fn list_devices(
    claims: web::ReqData<Claims>,
    service: web::Data<CredentialService>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("list_devices").with_user_id(&claims.sub);

    let account = service
        .current_account(&claims)
        .await
        .map_err(|e| context.record(e))?;
    let devices = service
        .list_devices(account.id)
        .await
        .map_err(|e| context.record(e))?;

    Ok(HttpResponse::Ok().json(devices))
}

/// GET /devices/last
pub async fn last_used_device(
    claims: web::ReqData<Claims>,
    service: web::Data<CredentialService>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("last_used_device").with_user_id(&claims.sub);

    let account = service
        .current_account(&claims)
        .await
        .map_err(|e| context.record(e))?;
    let device = service
        .last_used_device(account.id)
        .await
        .map_err(|e| context.record(e))?;

    Ok(HttpResponse::Ok().json(device))
}

/// GET /devices/{id}
pub async fn get_device(
    claims: web::ReqData<Claims>,
    path: web::Path<Uuid>,
    service: web::Data<CredentialService>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("find_device").with_user_id(&claims.sub);

    let account = service
        .current_account(&claims)
        .await
        .map_err(|e| context.record(e))?;
    let device = service
        .find_device(account.id, path.into_inner())
        .await
        .map_err(|e| context.record(e))?;

    Ok(HttpResponse::Ok().json(device))
}

/// DELETE /devices/{id}
///
/// Soft revoke: the record stays listed as untrusted.
pub async fn revoke_device(
    claims: web::ReqData<Claims>,
    path: web::Path<Uuid>,
    service: web::Data<CredentialService>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("revoke_device").with_user_id(&claims.sub);

    let account = service
        .current_account(&claims)
        .await
        .map_err(|e| context.record(e))?;
    service
        .revoke_device(account.id, path.into_inner())
        .await
        .map_err(|e| context.record(e))?;

    Ok(HttpResponse::NoContent().finish())
}

/// DELETE /devices
///
/// Revokes every device except the caller's (its `deviceId` cookie, or the
/// most recently used device).
pub async fn revoke_other_devices(
    claims: web::ReqData<Claims>,
    fingerprint: web::ReqData<DeviceFingerprint>,
    service: web::Data<CredentialService>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("revoke_other_devices").with_user_id(&claims.sub);

    let account = service
        .current_account(&claims)
        .await
        .map_err(|e| context.record(e))?;
    let current = (!fingerprint.is_new).then(|| fingerprint.value.clone());

    let result = service
        .revoke_all_except_current(account.id, current.as_deref())
        .await
        .map_err(|e| context.record(e))?;

    Ok(HttpResponse::Ok().json(RevokeOthersResponse {
        kept_device_id: result.kept.id,
        revoked: result.revoked,
    }))
}
