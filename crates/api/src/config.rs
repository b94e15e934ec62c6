//! Application configuration.
//!
//! Sources, lowest priority first:
//! 1. built-in defaults
//! 2. `config/default.*` and `config/local.*` (optional)
//! 3. environment variables `CRITICA__<SECTION>__<KEY>`

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use critica_observability::LoggingSettings;

/// Development-only signing secret used when none is configured.
pub const DEV_JWT_SECRET: &str = "critica-dev-secret-change-me-in-production";
pub const MIN_JWT_SECRET_LEN: usize = 32;
/// Upper bound for every `*_ttl_minutes` setting (one year).
pub const MAX_TTL_MINUTES: i64 = 366 * 24 * 60;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub database: DatabaseConfig,
    pub mail: MailConfig,
    pub logging: LoggingSettings,
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub token_ttl_minutes: i64,
    pub confirmation_ttl_minutes: i64,
    pub uniform_token_errors: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: DEV_JWT_SECRET.to_string(),
            token_ttl_minutes: 24 * 60,
            confirmation_ttl_minutes: 30,
            uniform_token_errors: false,
        }
    }
}

/// `url` absent means the in-memory account store.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: Option<String>,
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MailBackend {
    #[default]
    Log,
    Smtp,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    pub from: String,
    pub backend: MailBackend,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            from: "noreply@critica.local".to_string(),
            backend: MailBackend::Log,
            smtp_host: "localhost".to_string(),
            smtp_port: 587,
            smtp_username: None,
            smtp_password: None,
        }
    }
}

/// Administrator account created at startup if missing.
#[derive(Debug, Clone, Deserialize)]
pub struct BootstrapAdmin {
    pub username: String,
    pub email: String,
}

impl AppConfig {
    /// Load from files and environment.
    pub fn load() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::with_prefix("CRITICA")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Reject settings the server cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_ttl("auth.token_ttl_minutes", self.auth.token_ttl_minutes)?;
        check_ttl("auth.confirmation_ttl_minutes", self.auth.confirmation_ttl_minutes)?;
        if self.auth.jwt_secret == DEV_JWT_SECRET {
            tracing::warn!("auth.jwt_secret not set; using insecure dev default");
        } else if self.auth.jwt_secret.len() < MIN_JWT_SECRET_LEN {
            return Err(ConfigError::Message(format!(
                "auth.jwt_secret must be at least {MIN_JWT_SECRET_LEN} bytes"
            )));
        }
        if self.mail.backend == MailBackend::Smtp && self.mail.smtp_host.trim().is_empty() {
            return Err(ConfigError::Message(
                "mail.smtp_host is required for the smtp backend".into(),
            ));
        }
        Ok(())
    }
}

fn check_ttl(key: &str, minutes: i64) -> Result<(), ConfigError> {
    if (1..=MAX_TTL_MINUTES).contains(&minutes) {
        Ok(())
    } else {
        Err(ConfigError::Message(format!(
            "{key} must be between 1 and {MAX_TTL_MINUTES}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = AppConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.auth.confirmation_ttl_minutes, 30);
        assert_eq!(cfg.mail.backend, MailBackend::Log);
        assert!(cfg.database.url.is_none());
    }

    #[test]
    fn short_secret_and_zero_ttl_are_rejected() {
        let mut cfg = AppConfig::default();
        cfg.auth.jwt_secret = "short".into();
        assert!(cfg.validate().is_err());

        let mut cfg = AppConfig::default();
        cfg.auth.confirmation_ttl_minutes = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn oversized_ttls_are_rejected() {
        for minutes in [MAX_TTL_MINUTES + 1, i64::MAX] {
            let mut cfg = AppConfig::default();
            cfg.auth.token_ttl_minutes = minutes;
            assert!(cfg.validate().is_err(), "{minutes}");

            let mut cfg = AppConfig::default();
            cfg.auth.confirmation_ttl_minutes = minutes;
            assert!(cfg.validate().is_err(), "{minutes}");
        }

        let mut cfg = AppConfig::default();
        cfg.auth.token_ttl_minutes = MAX_TTL_MINUTES;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn partial_sources_fall_back_to_defaults() {
        let cfg: AppConfig = Config::builder()
            .set_override("auth.uniform_token_errors", true)
            .unwrap()
            .set_override("logging.format", "pretty")
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert!(cfg.auth.uniform_token_errors);
        assert_eq!(cfg.auth.token_ttl_minutes, 24 * 60);
        assert_eq!(cfg.server.bind, "0.0.0.0:8080");
        assert_eq!(cfg.logging.format, critica_observability::LogFormat::Pretty);
    }
}
