//! # Configuration
//!
//! [`AppConfig`] is read once at startup from environment variables. Every
//! variable has a default except `JWT_SECRET`, which falls back to a random
//! per-process secret so that a development server starts without setup.
//! Tokens signed with that secret do not survive a restart.

use std::path::PathBuf;

use rand_core::{OsRng, RngCore};
use thiserror::Error;
use zeroize::Zeroizing;

use klk_core::validation::DEFAULT_MAX_UPLOAD_BYTES;

/// Default PBKDF2 work factor for new password hashes.
pub const DEFAULT_PASSWORD_ITERATIONS: u32 = 120_000;

/// A malformed environment variable.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// The value could not be parsed as the expected type.
    #[error("{name} is invalid: {value:?} ({reason})")]
    Invalid {
        /// Variable name.
        name: &'static str,
        /// Raw value.
        value: String,
        /// Parser message.
        reason: String,
    },
    /// The signing secret is too short to be useful.
    #[error("JWT_SECRET must be at least 32 bytes, got {0}")]
    WeakSecret(usize),
}

/// Output format of the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

impl LogFormat {
    /// `json` selects [`LogFormat::Json`]; anything else is text.
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Text,
        }
    }
}

/// Runtime configuration for the API server.
///
/// `Debug` redacts the signing secret.
#[derive(Clone)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub jwt_secret: Zeroizing<Vec<u8>>,
    pub jwt_expiration_hours: i64,
    pub media_root: PathBuf,
    pub max_upload_bytes: usize,
    pub password_iterations: u32,
    pub log_format: LogFormat,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("port", &self.port)
            .field("database_url", &self.database_url)
            .field("jwt_secret", &"[REDACTED]")
            .field("jwt_expiration_hours", &self.jwt_expiration_hours)
            .field("media_root", &self.media_root)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("password_iterations", &self.password_iterations)
            .field("log_format", &self.log_format)
            .finish()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            database_url: "sqlite://klk.db?mode=rwc".to_string(),
            jwt_secret: random_secret(),
            jwt_expiration_hours: 24,
            media_root: PathBuf::from("./media"),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            password_iterations: DEFAULT_PASSWORD_ITERATIONS,
            log_format: LogFormat::Text,
        }
    }
}

impl AppConfig {
    /// Build from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let jwt_secret = match lookup("JWT_SECRET") {
            Some(secret) if secret.len() < 32 => return Err(ConfigError::WeakSecret(secret.len())),
            Some(secret) => Zeroizing::new(secret.into_bytes()),
            None => {
                tracing::warn!(
                    "JWT_SECRET not set; using an ephemeral secret, tokens will not survive a restart"
                );
                defaults.jwt_secret.clone()
            }
        };

        let log_format = LogFormat::parse(lookup("LOG_FORMAT").as_deref());

        Ok(Self {
            port: parsed(&lookup, "PORT")?.unwrap_or(defaults.port),
            database_url: lookup("DATABASE_URL").unwrap_or(defaults.database_url),
            jwt_secret,
            jwt_expiration_hours: parsed(&lookup, "JWT_EXPIRATION_HOURS")?
                .unwrap_or(defaults.jwt_expiration_hours),
            media_root: lookup("MEDIA_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.media_root),
            max_upload_bytes: parsed(&lookup, "MAX_UPLOAD_BYTES")?
                .unwrap_or(defaults.max_upload_bytes),
            password_iterations: parsed(&lookup, "PASSWORD_ITERATIONS")?
                .unwrap_or(defaults.password_iterations),
            log_format,
        })
    }
}

fn parsed<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::Invalid {
                name,
                value: raw.clone(),
                reason: e.to_string(),
            }),
    }
}

fn random_secret() -> Zeroizing<Vec<u8>> {
    let mut bytes = Zeroizing::new(vec![0u8; 32]);
    OsRng.fill_bytes(&mut bytes);
    bytes
}
