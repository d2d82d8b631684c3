//! Configuration layer: typed settings with layered precedence
//! (defaults → file → environment → CLI).

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use clap::{Args, Parser};
use common::cache::RedisConfig;
use common::database::DatabaseConfig;
use common::mail::EmailConfig;
use config::{Config, Environment as EnvSource, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

const APP_NAME: &str = "Blog-API";
const DEFAULT_PORT: u16 = 8000;
const DEFAULT_CACHE_TTL_SECS: u64 = 60 * 60 * 24;
const DEFAULT_ADMIN_EMAIL: &str = "admin@example.com";
const DEFAULT_REDIS_HOST: &str = "localhost";
const DEFAULT_REDIS_PORT: u16 = 6379;
const DEFAULT_EMAIL_HOST: &str = "smtp.gmail.com";
const DEFAULT_EMAIL_PORT: u16 = 465;
const DEFAULT_EMAIL_SENDER: &str = "MASTER";
const DEFAULT_GOOGLE_ACCOUNT_FILE: &str = "classified/google_service_account.json";
const DEFAULT_DOCS_USER: &str = "admin";
const DEFAULT_DOCS_PASSWORD: &str = "admin";
const DEFAULT_BODY_LIMIT_BYTES: usize = 1024 * 1024;

/// Command-line arguments for the API binary.
#[derive(Debug, Parser)]
#[command(name = "blog-api", version, about = "Blog API server")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "BLOG_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: Overrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct Overrides {
    /// Override the listener port.
    #[arg(long = "port", value_name = "PORT")]
    pub port: Option<u16>,

    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    #[arg(long = "redis-host", value_name = "HOST")]
    pub redis_host: Option<String>,

    #[arg(long = "redis-port", value_name = "PORT")]
    pub redis_port: Option<u16>,

    #[arg(long = "redis-username", value_name = "USER")]
    pub redis_username: Option<String>,

    #[arg(long = "redis-password", value_name = "PASSWORD")]
    pub redis_password: Option<String>,

    /// Recipient of alarm mails.
    #[arg(long = "admin-email", value_name = "EMAIL")]
    pub admin_email: Option<String>,

    #[arg(long = "email-host", value_name = "HOST")]
    pub email_host: Option<String>,

    #[arg(long = "email-account", value_name = "EMAIL")]
    pub email_account: Option<String>,

    #[arg(long = "email-password", value_name = "PASSWORD")]
    pub email_password: Option<String>,

    /// Override the runtime environment (development|test|production).
    #[arg(long = "environment", value_name = "ENV")]
    pub environment: Option<String>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeEnvironment {
    Development,
    Test,
    Production,
}

impl RuntimeEnvironment {
    pub fn is_production(self) -> bool {
        self == RuntimeEnvironment::Production
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RuntimeEnvironment::Development => "development",
            RuntimeEnvironment::Test => "test",
            RuntimeEnvironment::Production => "production",
        }
    }
}

impl FromStr for RuntimeEnvironment {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(RuntimeEnvironment::Development),
            "test" => Ok(RuntimeEnvironment::Test),
            "production" | "prod" => Ok(RuntimeEnvironment::Production),
            other => Err(format!("unknown environment `{}`", other)),
        }
    }
}

impl fmt::Display for RuntimeEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct AppSettings {
    pub name: String,
    pub environment: RuntimeEnvironment,
    pub port: u16,
    /// TTL applied by the route cache when a route sets none
    pub default_cache_ttl: u64,
    pub admin_email: String,
    pub body_limit: usize,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
}

#[derive(Debug, Clone)]
pub struct GoogleSettings {
    pub service_account_file: PathBuf,
}

/// Basic-auth gate of the documentation and token endpoints
#[derive(Debug, Clone)]
pub struct DocsSettings {
    pub enabled: bool,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub app: AppSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub email: EmailConfig,
    pub google: GoogleSettings,
    pub docs: DocsSettings,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder().add_source(File::with_name("config/default").required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(EnvSource::with_prefix("BLOG").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_overrides(&cli.overrides);
    Settings::from_raw(raw)
}

/// Parse the process arguments and resolve settings.
pub fn load_with_cli() -> Result<(CliArgs, Settings), ConfigError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    app: RawAppSettings,
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    redis: RawRedisSettings,
    email: RawEmailSettings,
    google: RawGoogleSettings,
    docs: RawDocsSettings,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawAppSettings {
    name: Option<String>,
    environment: Option<String>,
    port: Option<u16>,
    default_cache_ttl: Option<u64>,
    admin_email: Option<String>,
    body_limit: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
    min_connections: Option<u32>,
    connection_timeout_seconds: Option<u64>,
    reconnect_interval_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRedisSettings {
    host: Option<String>,
    port: Option<u16>,
    username: Option<String>,
    password: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawEmailSettings {
    host: Option<String>,
    port: Option<u16>,
    account: Option<String>,
    password: Option<String>,
    sender_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawGoogleSettings {
    service_account_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDocsSettings {
    enabled: Option<bool>,
    username: Option<String>,
    password: Option<String>,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(port) = overrides.port {
            self.app.port = Some(port);
        }
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(host) = overrides.redis_host.as_ref() {
            self.redis.host = Some(host.clone());
        }
        if let Some(port) = overrides.redis_port {
            self.redis.port = Some(port);
        }
        if let Some(username) = overrides.redis_username.as_ref() {
            self.redis.username = Some(username.clone());
        }
        if let Some(password) = overrides.redis_password.as_ref() {
            self.redis.password = Some(password.clone());
        }
        if let Some(email) = overrides.admin_email.as_ref() {
            self.app.admin_email = Some(email.clone());
        }
        if let Some(host) = overrides.email_host.as_ref() {
            self.email.host = Some(host.clone());
        }
        if let Some(account) = overrides.email_account.as_ref() {
            self.email.account = Some(account.clone());
        }
        if let Some(password) = overrides.email_password.as_ref() {
            self.email.password = Some(password.clone());
        }
        if let Some(environment) = overrides.environment.as_ref() {
            self.app.environment = Some(environment.clone());
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, ConfigError> {
        let environment = match raw.app.environment.as_deref() {
            Some(value) => value
                .parse()
                .map_err(|reason: String| ConfigError::invalid("app.environment", reason))?,
            None => RuntimeEnvironment::Development,
        };

        let level = match raw.logging.level.as_deref() {
            Some(value) => LevelFilter::from_str(value)
                .map_err(|_| ConfigError::invalid("logging.level", format!("unknown level `{}`", value)))?,
            None => LevelFilter::INFO,
        };

        let default_cache_ttl = raw.app.default_cache_ttl.unwrap_or(DEFAULT_CACHE_TTL_SECS);
        if default_cache_ttl == 0 {
            return Err(ConfigError::invalid(
                "app.default_cache_ttl",
                "must be greater than zero",
            ));
        }

        let body_limit = raw.app.body_limit.unwrap_or(DEFAULT_BODY_LIMIT_BYTES);
        if body_limit == 0 {
            return Err(ConfigError::invalid("app.body_limit", "must be greater than zero"));
        }

        let database_defaults = DatabaseConfig::default();
        let database = DatabaseConfig {
            database_url: raw.database.url.unwrap_or(database_defaults.database_url),
            max_connections: raw
                .database
                .max_connections
                .unwrap_or(database_defaults.max_connections),
            min_connections: raw
                .database
                .min_connections
                .unwrap_or(database_defaults.min_connections),
            connection_timeout: raw
                .database
                .connection_timeout_seconds
                .map(Duration::from_secs)
                .unwrap_or(database_defaults.connection_timeout),
            reconnect_interval: raw
                .database
                .reconnect_interval_seconds
                .map(Duration::from_secs)
                .unwrap_or(database_defaults.reconnect_interval),
        };
        if database.max_connections == 0 {
            return Err(ConfigError::invalid(
                "database.max_connections",
                "must be greater than zero",
            ));
        }

        let redis = RedisConfig {
            host: raw.redis.host.unwrap_or_else(|| DEFAULT_REDIS_HOST.to_string()),
            port: raw.redis.port.unwrap_or(DEFAULT_REDIS_PORT),
            username: raw.redis.username,
            password: raw.redis.password,
            ..RedisConfig::default()
        };
        redis
            .url()
            .map_err(|e| ConfigError::invalid("redis.host", e.to_string()))?;

        let email = EmailConfig {
            host: raw.email.host.unwrap_or_else(|| DEFAULT_EMAIL_HOST.to_string()),
            port: raw.email.port.unwrap_or(DEFAULT_EMAIL_PORT),
            account: raw.email.account.unwrap_or_default(),
            password: raw.email.password.unwrap_or_default(),
            sender_name: raw
                .email
                .sender_name
                .unwrap_or_else(|| DEFAULT_EMAIL_SENDER.to_string()),
        };

        Ok(Self {
            app: AppSettings {
                name: raw.app.name.unwrap_or_else(|| APP_NAME.to_string()),
                environment,
                port: raw.app.port.unwrap_or(DEFAULT_PORT),
                default_cache_ttl,
                admin_email: raw
                    .app
                    .admin_email
                    .unwrap_or_else(|| DEFAULT_ADMIN_EMAIL.to_string()),
                body_limit,
            },
            logging: LoggingSettings { level },
            database,
            redis,
            email,
            google: GoogleSettings {
                service_account_file: raw
                    .google
                    .service_account_file
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_GOOGLE_ACCOUNT_FILE)),
            },
            docs: DocsSettings {
                enabled: raw.docs.enabled.unwrap_or(true),
                username: raw
                    .docs
                    .username
                    .unwrap_or_else(|| DEFAULT_DOCS_USER.to_string()),
                password: raw
                    .docs
                    .password
                    .unwrap_or_else(|| DEFAULT_DOCS_PASSWORD.to_string()),
            },
        })
    }

    /// Built-in defaults for `environment`, ignoring files and variables
    pub fn defaults(environment: RuntimeEnvironment) -> Result<Self, ConfigError> {
        let mut raw = RawSettings::default();
        raw.app.environment = Some(environment.as_str().to_string());
        Settings::from_raw(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn defaults_resolve() {
        let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");
        assert_eq!(settings.app.port, DEFAULT_PORT);
        assert_eq!(settings.app.default_cache_ttl, 86_400);
        assert_eq!(settings.app.body_limit, 1024 * 1024);
        assert_eq!(settings.app.environment, RuntimeEnvironment::Development);
        assert_eq!(settings.email.port, 465);
        assert_eq!(settings.email.sender_name, "MASTER");
        assert_eq!(settings.database.reconnect_interval, Duration::from_secs(6));
        assert_eq!(settings.logging.level, LevelFilter::INFO);
    }

    #[test]
    fn cli_overrides_take_highest_precedence() {
        let mut raw = RawSettings::default();
        raw.app.port = Some(4000);
        raw.redis.host = Some("redis.from.file".to_string());

        let overrides = Overrides {
            port: Some(4321),
            redis_host: Some("redis.from.cli".to_string()),
            environment: Some("production".to_string()),
            log_level: Some("debug".to_string()),
            ..Default::default()
        };

        raw.apply_overrides(&overrides);
        let settings = Settings::from_raw(raw).expect("valid settings");

        assert_eq!(settings.app.port, 4321);
        assert_eq!(settings.redis.host, "redis.from.cli");
        assert!(settings.app.environment.is_production());
        assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    }

    #[test]
    fn unknown_environment_is_rejected() {
        let mut raw = RawSettings::default();
        raw.app.environment = Some("staging".to_string());
        let err = Settings::from_raw(raw).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "app.environment", .. }));
    }

    #[test]
    fn zero_cache_ttl_is_rejected() {
        let mut raw = RawSettings::default();
        raw.app.default_cache_ttl = Some(0);
        let err = Settings::from_raw(raw).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "app.default_cache_ttl", .. }));
    }

    #[test]
    #[serial]
    fn environment_variables_are_layered() {
        unsafe {
            std::env::set_var("BLOG__APP__PORT", "9100");
            std::env::set_var("BLOG__REDIS__PORT", "6390");
            std::env::set_var("BLOG__DOCS__ENABLED", "false");
        }
        let cli = CliArgs {
            config_file: None,
            overrides: Overrides::default(),
        };
        let settings = load(&cli);
        unsafe {
            std::env::remove_var("BLOG__APP__PORT");
            std::env::remove_var("BLOG__REDIS__PORT");
            std::env::remove_var("BLOG__DOCS__ENABLED");
        }

        let settings = settings.expect("valid settings");
        assert_eq!(settings.app.port, 9100);
        assert_eq!(settings.redis.port, 6390);
        assert!(!settings.docs.enabled);
    }

    #[test]
    fn cli_parses_flags() {
        let cli = CliArgs::parse_from([
            "blog-api",
            "--port",
            "8080",
            "--redis-password",
            "secret",
            "--admin-email",
            "ops@example.com",
        ]);
        assert_eq!(cli.overrides.port, Some(8080));
        assert_eq!(cli.overrides.redis_password.as_deref(), Some("secret"));
        assert_eq!(cli.overrides.admin_email.as_deref(), Some("ops@example.com"));
    }
}
