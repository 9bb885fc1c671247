#![allow(dead_code)]

use std::net::TcpListener;
use std::sync::Arc;

use authcore::auth::{CredentialService, PasswordHasher, TokenCodec};
use authcore::configuration::{AuthSettings, CookieSettings, JwtSettings, PasswordSettings};
use authcore::startup::run;
use authcore::store::{InMemoryAccountRepository, InMemoryDeviceStore};
use serde_json::{json, Value};

pub const PASSWORD: &str = "SecurePass123";

pub struct TestApp {
    pub address: String,
    pub client: reqwest::Client,
}

pub fn spawn_app() -> TestApp {
    spawn_app_with(AuthSettings::default())
}

pub fn spawn_app_with(policy: AuthSettings) -> TestApp {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();

    let jwt = JwtSettings {
        access_secret: "integration-access-secret-0123456789abcdef".to_string(),
        refresh_secret: "integration-refresh-secret-0123456789abcdef".to_string(),
        access_token_expiry: 900,
        refresh_token_expiry: 604800,
        issuer: "authcore-test".to_string(),
    };
    // Cheap argon2 costs keep the suite fast
    let password = PasswordSettings {
        memory_cost: 1024,
        time_cost: 1,
        parallelism: 1,
        output_length: 32,
    };

    let service = CredentialService::new(
        Arc::new(InMemoryAccountRepository::new()),
        Arc::new(InMemoryDeviceStore::new()),
        PasswordHasher::new(&password).expect("valid password settings"),
        TokenCodec::new(&jwt).expect("valid jwt settings"),
        policy,
    );
    let cookies = CookieSettings {
        secure: false,
        ..CookieSettings::default()
    };

    let server = run(listener, service, cookies).expect("Failed to bind address");
    let _ = tokio::spawn(server);

    TestApp {
        address: format!("http://127.0.0.1:{}", port),
        client: reqwest::Client::new(),
    }
}

/// Value of cookie `name` from the response's Set-Cookie headers
pub fn set_cookie(response: &reqwest::Response, name: &str) -> Option<String> {
    set_cookie_header(response, name).and_then(|header| {
        header
            .split(';')
            .next()
            .and_then(|pair| pair.split_once('='))
            .map(|(_, value)| value.to_string())
    })
}

/// Full Set-Cookie header for cookie `name`
pub fn set_cookie_header(response: &reqwest::Response, name: &str) -> Option<String> {
    let prefix = format!("{}=", name);
    response
        .headers()
        .get_all(reqwest::header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find(|value| value.starts_with(&prefix))
        .map(str::to_string)
}

pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub body: Value,
}

impl TestApp {
    pub async fn post_register(&self, email: &str, device: &str) -> reqwest::Response {
        self.client
            .post(&format!("{}/auth/register", self.address))
            .header("Cookie", format!("deviceId={}", device))
            .json(&json!({
                "name": "John",
                "lastName": "Doe",
                "email": email,
                "password": PASSWORD,
            }))
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn post_login(&self, email: &str, password: &str, device: &str) -> reqwest::Response {
        self.client
            .post(&format!("{}/auth/login", self.address))
            .header("Cookie", format!("deviceId={}", device))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn post_refresh(&self, refresh_token: &str, device: &str) -> reqwest::Response {
        self.client
            .post(&format!("{}/auth/refresh", self.address))
            .header(
                "Cookie",
                format!("refreshToken={}; deviceId={}", refresh_token, device),
            )
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn get_with_bearer(&self, path: &str, access_token: &str) -> reqwest::Response {
        self.client
            .get(&format!("{}{}", self.address, path))
            .bearer_auth(access_token)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn register(&self, email: &str, device: &str) -> Session {
        let response = self.post_register(email, device).await;
        assert_eq!(201, response.status().as_u16());
        into_session(response).await
    }

    pub async fn login(&self, email: &str, device: &str) -> Session {
        let response = self.post_login(email, PASSWORD, device).await;
        assert_eq!(200, response.status().as_u16());
        into_session(response).await
    }
}

pub async fn into_session(response: reqwest::Response) -> Session {
    let refresh_token = set_cookie(&response, "refreshToken").expect("refresh cookie");
    let body: Value = response.json().await.expect("Failed to parse response");
    let access_token = body["accessToken"]
        .as_str()
        .expect("access token in body")
        .to_string();

    Session {
        access_token,
        refresh_token,
        body,
    }
}
