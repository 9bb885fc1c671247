use config::ConfigError;

#[derive(serde::Deserialize, Clone)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub application: ApplicationSettings,
    pub jwt: JwtSettings,
    #[serde(default)]
    pub password: PasswordSettings,
    #[serde(default)]
    pub auth: AuthSettings,
    #[serde(default)]
    pub cookies: CookieSettings,
}

#[derive(serde::Deserialize, Clone)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
}

#[derive(serde::Deserialize, Clone)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: String,
    pub port: u16,
    pub host: String,
    pub database_name: String,
}

impl DatabaseSettings {
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database_name
        )
    }
}

/// JWT signing settings.
///
/// Access and refresh tokens are signed with independent secrets so that a
/// leaked access key cannot mint refresh tokens and vice versa.
#[derive(serde::Deserialize, Clone)]
pub struct JwtSettings {
    pub access_secret: String,
    pub refresh_secret: String,
    pub access_token_expiry: i64,   // seconds (e.g., 900 for 15 minutes)
    pub refresh_token_expiry: i64,  // seconds (e.g., 604800 for 7 days)
    pub issuer: String,
}

/// Argon2id cost parameters
#[derive(serde::Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PasswordSettings {
    /// Memory cost in KiB
    pub memory_cost: u32,
    pub time_cost: u32,
    pub parallelism: u32,
    pub output_length: usize,
}

impl Default for PasswordSettings {
    fn default() -> Self {
        Self {
            memory_cost: 65536,
            time_cost: 3,
            parallelism: 2,
            output_length: 32,
        }
    }
}

/// Session policy switches
#[derive(serde::Deserialize, Clone, Debug)]
#[serde(default)]
pub struct AuthSettings {
    /// Revoke the device bound to the presented refresh token on logout
    pub revoke_device_on_logout: bool,
    /// Include the refresh token in JSON bodies (it is always set as a cookie)
    pub expose_refresh_token: bool,
    /// Mark new accounts as email-verified at registration
    pub auto_verify_email: bool,
    /// Reject unverified accounts at every entry point
    pub require_verified_email: bool,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            revoke_device_on_logout: false,
            expose_refresh_token: false,
            auto_verify_email: true,
            require_verified_email: false,
        }
    }
}

#[derive(serde::Deserialize, Clone, Debug)]
#[serde(default)]
pub struct CookieSettings {
    pub secure: bool,
    pub refresh_path: String,
    pub device_max_age_days: i64,
}

impl Default for CookieSettings {
    fn default() -> Self {
        Self {
            secure: true,
            refresh_path: "/auth".to_string(),
            device_max_age_days: 30,
        }
    }
}

/// Load settings from `configuration.{yaml,toml,json}` and `APP__*` environment variables.
///
/// `APP__JWT__ACCESS_SECRET=...` overrides `jwt.access_secret`.
pub fn get_configuration() -> Result<Settings, ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("configuration").required(false))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("__")
                .separator("__"),
        )
        .build()?;
    settings.try_deserialize::<Settings>()
}
