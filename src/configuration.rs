use crate::error::ConfigError;

const MIN_SECRET_LENGTH: usize = 32;

#[derive(serde::Deserialize, Clone, Debug)]
pub struct Settings {
    pub application: ApplicationSettings,
    pub database: DatabaseSettings,
    pub jwt: JwtSettings,
    pub tokens: TokenSettings,
    pub timeouts: TimeoutSettings,
    pub email_client: EmailClientSettings,
}

#[derive(serde::Deserialize, Clone, Debug)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
    /// Used as the `iss` claim of every token we sign
    pub name: String,
    /// Public URL used to build verification and recovery links
    pub base_url: String,
    pub password_hash_cost: u32,
}

#[derive(serde::Deserialize, Clone, Debug)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: String,
    pub port: u16,
    pub host: String,
    pub database_name: String,
    pub max_connections: u32,
}

impl DatabaseSettings {
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database_name
        )
    }
}

/// JWT signing settings
///
/// Each token class has its own secret so that leaking one of them
/// cannot be used to forge another kind of token.
#[derive(serde::Deserialize, Clone)]
pub struct JwtSettings {
    pub access_secret: String,
    pub refresh_secret: String,
    pub verification_secret: String,
    pub recovery_secret: String,
    pub access_token_expiry_hours: i64,
    pub refresh_token_expiry_days: i64,
    /// Signed expiry of verification / recovery tokens
    pub email_token_validity_hours: i64,
}

impl std::fmt::Debug for JwtSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtSettings")
            .field("access_secret", &"[redacted]")
            .field("refresh_secret", &"[redacted]")
            .field("verification_secret", &"[redacted]")
            .field("recovery_secret", &"[redacted]")
            .field("access_token_expiry_hours", &self.access_token_expiry_hours)
            .field("refresh_token_expiry_days", &self.refresh_token_expiry_days)
            .field("email_token_validity_hours", &self.email_token_validity_hours)
            .finish()
    }
}

impl JwtSettings {
    pub fn access_token_expiry_seconds(&self) -> i64 {
        self.access_token_expiry_hours * 3600
    }
}

/// Server-side TTL policy for emailed tokens, in minutes.
/// Enforced against the stored generation time, not the signed `exp`.
#[derive(serde::Deserialize, Clone, Debug)]
pub struct TokenSettings {
    pub verify_email_ttl_minutes: i64,
    pub recover_password_ttl_minutes: i64,
}

/// Per-operation timeouts in seconds
#[derive(serde::Deserialize, Clone, Debug)]
pub struct TimeoutSettings {
    pub login: u64,
    pub register: u64,
    pub recover_password: u64,
    pub reset_password: u64,
    pub change_password: u64,
    pub refresh: u64,
    pub email_exists: u64,
    pub username_exists: u64,
    pub create_user: u64,
    pub get_user: u64,
    pub token_version: u64,
    pub email_send: u64,
    pub verify_email: u64,
}

#[derive(serde::Deserialize, Clone, Debug)]
pub struct EmailClientSettings {
    pub base_url: String,
    pub sender_email: String,
}

impl Settings {
    /// Reject configurations that would weaken token isolation
    pub fn validate(&self) -> Result<(), ConfigError> {
        let secrets = [
            ("jwt.access_secret", &self.jwt.access_secret),
            ("jwt.refresh_secret", &self.jwt.refresh_secret),
            ("jwt.verification_secret", &self.jwt.verification_secret),
            ("jwt.recovery_secret", &self.jwt.recovery_secret),
        ];

        for (name, secret) in secrets.iter() {
            if secret.len() < MIN_SECRET_LENGTH {
                return Err(ConfigError::InvalidValue(format!(
                    "{} must be at least {} bytes",
                    name, MIN_SECRET_LENGTH
                )));
            }
        }

        for (i, (name_a, a)) in secrets.iter().enumerate() {
            for (name_b, b) in secrets.iter().skip(i + 1) {
                if a == b {
                    return Err(ConfigError::InvalidValue(format!(
                        "{} and {} must differ",
                        name_a, name_b
                    )));
                }
            }
        }

        if self.jwt.access_token_expiry_hours <= 0 || self.jwt.refresh_token_expiry_days <= 0 {
            return Err(ConfigError::InvalidValue(
                "token expiry must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

pub fn get_configuration() -> Result<Settings, ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("configuration").required(false))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    let settings = settings
        .try_deserialize::<Settings>()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;
    settings.validate()?;
    Ok(settings)
}
