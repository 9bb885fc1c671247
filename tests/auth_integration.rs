mod common;

use authcore::configuration::AuthSettings;
use common::{set_cookie, set_cookie_header, spawn_app, spawn_app_with, PASSWORD};
use serde_json::{json, Value};

// --- Registration Tests ---

#[tokio::test]
async fn register_returns_201_with_tokens_and_refresh_cookie() {
    let app = spawn_app();

    let response = app.post_register("john@example.com", "laptop").await;
    assert_eq!(201, response.status().as_u16());

    let cookie = set_cookie_header(&response, "refreshToken").expect("refresh cookie");
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("SameSite=Strict"));
    assert!(cookie.contains("Path=/auth;") || cookie.ends_with("Path=/auth"));
    assert!(cookie.contains("Max-Age=604800"));

    let body: Value = response.json().await.expect("Failed to parse response");
    assert!(body["accessToken"].is_string());
    assert_eq!(body["tokenType"], "Bearer");
    assert_eq!(body["expiresIn"], 900);
    assert_eq!(body["refreshExpiresIn"], 604800);
    // Cookie-only by default
    assert!(body.get("refreshToken").is_none());
    assert_eq!(body["user"]["email"], "john@example.com");
    assert!(body["user"].get("passwordHash").is_none());
    assert_eq!(body["device"]["deviceId"], "laptop");
}

#[tokio::test]
async fn register_returns_409_for_duplicate_email() {
    let app = spawn_app();
    app.register("john@example.com", "laptop").await;

    let response = app.post_register("john@example.com", "phone").await;

    assert_eq!(409, response.status().as_u16());
}

#[tokio::test]
async fn register_returns_400_for_invalid_data() {
    let app = spawn_app();
    let test_cases = vec![
        (
            json!({"name": "John", "lastName": "Doe", "email": "not-an-email", "password": PASSWORD}),
            "invalid email",
        ),
        (
            json!({"name": "John", "lastName": "Doe", "email": "john@example.com", "password": "weak"}),
            "weak password",
        ),
        (
            json!({"name": "", "lastName": "Doe", "email": "john@example.com", "password": PASSWORD}),
            "empty name",
        ),
        (json!({"email": "john@example.com"}), "missing fields"),
    ];

    for (body, description) in test_cases {
        let response = app
            .client
            .post(&format!("{}/auth/register", app.address))
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request.");

        assert_eq!(
            400,
            response.status().as_u16(),
            "The API did not fail with 400 Bad Request for {}.",
            description
        );
    }
}

#[tokio::test]
async fn refresh_token_exposed_in_body_when_configured() {
    let app = spawn_app_with(AuthSettings {
        expose_refresh_token: true,
        ..AuthSettings::default()
    });

    let session = app.register("john@example.com", "laptop").await;

    assert_eq!(session.body["refreshToken"], session.refresh_token.as_str());
}

// --- Login Tests ---

#[tokio::test]
async fn login_returns_200_for_valid_credentials() {
    let app = spawn_app();
    app.register("john@example.com", "laptop").await;

    let session = app.login("john@example.com", "phone").await;

    assert_eq!(session.body["device"]["deviceId"], "phone");
    assert!(session.body["user"]["lastLoginAt"].is_string());
}

#[tokio::test]
async fn login_failures_are_indistinguishable() {
    let app = spawn_app();
    app.register("john@example.com", "laptop").await;

    let wrong_password = app
        .post_login("john@example.com", "WrongPass123", "laptop")
        .await;
    let unknown_email = app
        .post_login("nobody@example.com", PASSWORD, "laptop")
        .await;

    assert_eq!(401, wrong_password.status().as_u16());
    assert_eq!(401, unknown_email.status().as_u16());

    let first: Value = wrong_password.json().await.unwrap();
    let second: Value = unknown_email.json().await.unwrap();
    assert_eq!(first["code"], "UNAUTHORIZED");
    assert_eq!(first["message"], second["message"]);
    assert_eq!(first["code"], second["code"]);
}

// --- Refresh Tests ---

#[tokio::test]
async fn refresh_rotates_and_rejects_the_old_token() {
    let app = spawn_app();
    let first = app.register("john@example.com", "laptop").await;

    let response = app.post_refresh(&first.refresh_token, "laptop").await;
    assert_eq!(200, response.status().as_u16());
    let second = set_cookie(&response, "refreshToken").expect("rotated refresh cookie");
    assert_ne!(first.refresh_token, second);

    let replay = app.post_refresh(&first.refresh_token, "laptop").await;
    assert_eq!(401, replay.status().as_u16());

    let next = app.post_refresh(&second, "laptop").await;
    assert_eq!(200, next.status().as_u16());
}

#[tokio::test]
async fn refresh_accepts_token_from_body() {
    let app = spawn_app();
    let session = app.register("john@example.com", "laptop").await;

    let response = app
        .client
        .post(&format!("{}/auth/refresh", app.address))
        .header("Cookie", "deviceId=laptop")
        .json(&json!({ "refreshToken": session.refresh_token }))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(200, response.status().as_u16());
}

#[tokio::test]
async fn refresh_without_device_cookie_restores_the_bound_device_id() {
    let app = spawn_app();
    let session = app.register("john@example.com", "laptop").await;

    let response = app
        .client
        .post(&format!("{}/auth/refresh", app.address))
        .header("Cookie", format!("refreshToken={}", session.refresh_token))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(200, response.status().as_u16());

    let device_cookies: Vec<_> = response
        .headers()
        .get_all(reqwest::header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter(|value| value.starts_with("deviceId="))
        .collect();
    assert_eq!(device_cookies.len(), 1);
    assert!(device_cookies[0].starts_with("deviceId=laptop;"));

    let rotated = set_cookie(&response, "refreshToken").expect("rotated refresh cookie");
    let device = set_cookie(&response, "deviceId").expect("device cookie");

    let next = app.post_refresh(&rotated, &device).await;
    assert_eq!(200, next.status().as_u16());
}

#[tokio::test]
async fn rejected_refresh_clears_the_refresh_cookie() {
    let app = spawn_app();
    let session = app.register("john@example.com", "laptop").await;

    let first = app.post_refresh(&session.refresh_token, "laptop").await;
    assert_eq!(200, first.status().as_u16());

    let replay = app.post_refresh(&session.refresh_token, "laptop").await;
    assert_eq!(401, replay.status().as_u16());
    let cookie = set_cookie_header(&replay, "refreshToken").expect("cleared cookie");
    assert!(cookie.starts_with("refreshToken=;"));
    assert!(cookie.contains("Max-Age=0"));
}

#[tokio::test]
async fn refresh_without_token_is_401() {
    let app = spawn_app();

    let response = app
        .client
        .post(&format!("{}/auth/refresh", app.address))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(401, response.status().as_u16());
}

#[tokio::test]
async fn refresh_rejects_access_token() {
    let app = spawn_app();
    let session = app.register("john@example.com", "laptop").await;

    let response = app.post_refresh(&session.access_token, "laptop").await;

    assert_eq!(401, response.status().as_u16());
}

#[tokio::test]
async fn refresh_from_another_device_is_401() {
    let app = spawn_app();
    let session = app.register("john@example.com", "laptop").await;

    let response = app.post_refresh(&session.refresh_token, "stolen-elsewhere").await;

    assert_eq!(401, response.status().as_u16());
}

// --- Logout Tests ---

#[tokio::test]
async fn logout_clears_refresh_cookie() {
    let app = spawn_app();
    let session = app.register("john@example.com", "laptop").await;

    let response = app
        .client
        .post(&format!("{}/auth/logout", app.address))
        .json(&json!({ "refreshToken": session.refresh_token }))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(200, response.status().as_u16());
    let cookie = set_cookie_header(&response, "refreshToken").expect("cleared cookie");
    assert!(cookie.starts_with("refreshToken=;"));
    assert!(cookie.contains("Max-Age=0"));
    let device = set_cookie_header(&response, "deviceId").expect("cleared device cookie");
    assert!(device.starts_with("deviceId=;"));
    assert!(device.contains("Path=/"));
    assert!(device.contains("Max-Age=0"));

    // Device kept by default
    let refreshed = app.post_refresh(&session.refresh_token, "laptop").await;
    assert_eq!(200, refreshed.status().as_u16());
}

#[tokio::test]
async fn logout_revokes_device_when_configured() {
    let app = spawn_app_with(AuthSettings {
        revoke_device_on_logout: true,
        ..AuthSettings::default()
    });
    let session = app.register("john@example.com", "laptop").await;

    let response = app
        .client
        .post(&format!("{}/auth/logout", app.address))
        .json(&json!({ "refreshToken": session.refresh_token }))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(200, response.status().as_u16());

    let refreshed = app.post_refresh(&session.refresh_token, "laptop").await;
    assert_eq!(401, refreshed.status().as_u16());
}

#[tokio::test]
async fn logout_with_browser_cookies_revokes_device_when_configured() {
    let app = spawn_app_with(AuthSettings {
        revoke_device_on_logout: true,
        ..AuthSettings::default()
    });
    let session = app.register("john@example.com", "laptop").await;

    // Only what a browser sends to /auth/logout under the refresh cookie path
    let response = app
        .client
        .post(&format!("{}/auth/logout", app.address))
        .header(
            "Cookie",
            format!("refreshToken={}; deviceId=laptop", session.refresh_token),
        )
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(200, response.status().as_u16());

    let refreshed = app.post_refresh(&session.refresh_token, "laptop").await;
    assert_eq!(401, refreshed.status().as_u16());

    let devices: Value = app
        .get_with_bearer("/devices", &session.access_token)
        .await
        .json()
        .await
        .expect("Failed to parse response");
    assert_eq!(devices[0]["isTrusted"], false);
}

// --- Protected Route Tests ---

#[tokio::test]
async fn validate_requires_access_token() {
    let app = spawn_app();
    let session = app.register("john@example.com", "laptop").await;

    let ok = app.get_with_bearer("/auth/validate", &session.access_token).await;
    assert_eq!(200, ok.status().as_u16());
    let body: Value = ok.json().await.unwrap();
    assert_eq!(body["valid"], true);
    assert_eq!(body["user"]["email"], "john@example.com");

    let missing = app
        .client
        .get(&format!("{}/auth/validate", app.address))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(401, missing.status().as_u16());

    let wrong_type = app.get_with_bearer("/auth/validate", &session.refresh_token).await;
    assert_eq!(401, wrong_type.status().as_u16());

    let garbage = app.get_with_bearer("/auth/validate", "invalid.token.here").await;
    assert_eq!(401, garbage.status().as_u16());
}

#[tokio::test]
async fn change_password_replaces_credentials() {
    let app = spawn_app();
    let session = app.register("john@example.com", "laptop").await;

    let response = app
        .client
        .post(&format!("{}/auth/password", app.address))
        .bearer_auth(&session.access_token)
        .json(&json!({ "currentPassword": PASSWORD, "newPassword": "NewSecure456" }))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(204, response.status().as_u16());

    let old = app.post_login("john@example.com", PASSWORD, "laptop").await;
    assert_eq!(401, old.status().as_u16());
    let new = app.post_login("john@example.com", "NewSecure456", "laptop").await;
    assert_eq!(200, new.status().as_u16());
}

#[tokio::test]
async fn change_password_with_wrong_current_is_401() {
    let app = spawn_app();
    let session = app.register("john@example.com", "laptop").await;

    let response = app
        .client
        .post(&format!("{}/auth/password", app.address))
        .bearer_auth(&session.access_token)
        .json(&json!({ "currentPassword": "WrongPass123", "newPassword": "NewSecure456" }))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(401, response.status().as_u16());
}
