//! Application configuration loaded from environment variables.

use chrono::Duration;
use domain::services::{CloudinarySettings, SmtpSettings};
use reconciliation::{DailySchedule, ReconcileSettings};
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

/// Minimum accepted length of `TOKEN_SECRET`.
pub const MIN_TOKEN_SECRET_LEN: usize = 32;

/// Errors that can occur while reading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required variable is not set.
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    /// A variable is set to an unusable value.
    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Server configuration.
///
/// Reads from environment variables:
/// - `HOST` / `PORT`: bind address (default: `0.0.0.0:3000`)
/// - `RUST_LOG` / `LOG_FORMAT`: tracing filter and `pretty` or `json` output
/// - `DATABASE_URL` / `DATABASE_MAX_CONNECTIONS`: PostgreSQL; unset runs in memory
/// - `TOKEN_SECRET` (required) / `TOKEN_EXPIRES_MINUTES`: bearer tokens
/// - `SMTP_*`: outbound email; unset logs messages instead
/// - `CLOUDINARY_*`: image storage; unset keeps images in memory
/// - `PAYMENT_WEBHOOK_SECRET`: payment webhook key; unset disables the webhook
/// - `RECONCILE_AT` / `RECONCILE_STALE_HOURS` / `RECONCILE_PENALIZE`: stale order sweep
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<SecretString>,
    pub database_max_connections: u32,
    pub token_secret: SecretString,
    pub token_expires: Duration,
    pub smtp: Option<SmtpSettings>,
    pub cloudinary: Option<CloudinarySettings>,
    pub payment_webhook_secret: Option<SecretString>,
    pub reconcile_at: DailySchedule,
    pub reconcile: ReconcileSettings,
}

fn parse_var<T: std::str::FromStr>(
    var: &'static str,
    value: Option<String>,
    default: T,
) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match value {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            reason: format!("'{raw}': {e}"),
        }),
        None => Ok(default),
    }
}

impl Config {
    /// Loads configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let require = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let log_format = match get("LOG_FORMAT").as_deref().map(str::to_ascii_lowercase) {
            None => LogFormat::Pretty,
            Some(f) if f == "pretty" => LogFormat::Pretty,
            Some(f) if f == "json" => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: "LOG_FORMAT",
                    reason: format!("'{other}': expected pretty or json"),
                });
            }
        };

        let token_secret = require("TOKEN_SECRET")?;
        if token_secret.len() < MIN_TOKEN_SECRET_LEN {
            return Err(ConfigError::Invalid {
                var: "TOKEN_SECRET",
                reason: format!("must be at least {MIN_TOKEN_SECRET_LEN} characters"),
            });
        }
        let token_minutes: i64 = parse_var("TOKEN_EXPIRES_MINUTES", get("TOKEN_EXPIRES_MINUTES"), 1440)?;
        if token_minutes <= 0 {
            return Err(ConfigError::Invalid {
                var: "TOKEN_EXPIRES_MINUTES",
                reason: "must be positive".to_string(),
            });
        }

        let smtp = match get("SMTP_HOST") {
            Some(host) => Some(SmtpSettings {
                host,
                port: parse_var("SMTP_PORT", get("SMTP_PORT"), 587)?,
                username: require("SMTP_USERNAME")?,
                password: SecretString::from(require("SMTP_PASSWORD")?),
                from: require("SMTP_FROM")?,
            }),
            None => None,
        };

        let cloudinary = match get("CLOUDINARY_CLOUD_NAME") {
            Some(cloud_name) => Some(CloudinarySettings {
                cloud_name,
                upload_preset: require("CLOUDINARY_UPLOAD_PRESET")?,
                folder: get("CLOUDINARY_FOLDER"),
            }),
            None => None,
        };

        let stale_hours: i64 = parse_var("RECONCILE_STALE_HOURS", get("RECONCILE_STALE_HOURS"), 24)?;
        if stale_hours <= 0 {
            return Err(ConfigError::Invalid {
                var: "RECONCILE_STALE_HOURS",
                reason: "must be positive".to_string(),
            });
        }
        let reconcile_at = match get("RECONCILE_AT") {
            Some(raw) => raw.parse().map_err(|e: reconciliation::ReconcileError| {
                ConfigError::Invalid {
                    var: "RECONCILE_AT",
                    reason: e.to_string(),
                }
            })?,
            None => DailySchedule::default(),
        };

        Ok(Self {
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_var("PORT", get("PORT"), 3000)?,
            log_level: get("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            log_format,
            database_url: get("DATABASE_URL").map(SecretString::from),
            database_max_connections: parse_var(
                "DATABASE_MAX_CONNECTIONS",
                get("DATABASE_MAX_CONNECTIONS"),
                10,
            )?,
            token_secret: SecretString::from(token_secret),
            token_expires: Duration::minutes(token_minutes),
            smtp,
            cloudinary,
            payment_webhook_secret: get("PAYMENT_WEBHOOK_SECRET").map(SecretString::from),
            reconcile_at,
            reconcile: ReconcileSettings {
                stale_after: Duration::hours(stale_hours),
                penalize_owner: parse_var("RECONCILE_PENALIZE", get("RECONCILE_PENALIZE"), true)?,
            },
        })
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn token_secret(&self) -> &str {
        self.token_secret.expose_secret()
    }
}
