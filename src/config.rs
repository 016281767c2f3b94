use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_GATEWAY_BASE_URL: &str = "https://api.razorpay.com";
const DEFAULT_CURRENCY: &str = "INR";

/// Pincodes served by the shop (Cherthala Taluk).
pub const DEFAULT_DELIVERY_PINCODES: [&str; 20] = [
    "688523", "688524", "688525", "688526", "688527", "688528", "688529", "688530", "688531",
    "688532", "688533", "688535", "688537", "688539", "688540", "688541", "688555", "688557",
    "688570", "688582",
];

/// Payment gateway credentials and endpoint.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct PaymentGatewayConfig {
    #[serde(default = "default_gateway_base_url")]
    #[validate(url)]
    pub base_url: String,

    /// Public key handed to clients to open the checkout widget
    #[serde(default)]
    pub key_id: String,

    #[serde(default)]
    pub key_secret: String,

    /// When set, incoming webhooks must carry a valid `X-Razorpay-Signature`
    #[serde(default)]
    pub webhook_secret: Option<String>,

    #[serde(default = "default_currency")]
    #[validate(length(equal = 3))]
    pub currency: String,

    /// Also bounds how long online checkout holds its stock locks
    #[serde(default = "default_gateway_timeout_secs")]
    #[validate(range(min = 1, max = 30))]
    pub timeout_secs: u64,
}

impl Default for PaymentGatewayConfig {
    fn default() -> Self {
        Self {
            base_url: default_gateway_base_url(),
            key_id: String::new(),
            key_secret: String::new(),
            webhook_secret: None,
            currency: default_currency(),
            timeout_secs: default_gateway_timeout_secs(),
        }
    }
}

/// Notification outbox worker settings
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct NotificationConfig {
    #[serde(default = "default_notification_retries")]
    #[validate(range(max = 10))]
    pub max_retries: u32,

    /// Fixed delay between delivery attempts
    #[serde(default = "default_notification_backoff_secs")]
    pub retry_backoff_secs: u64,

    #[serde(default = "default_notification_poll_ms")]
    #[validate(range(min = 50))]
    pub poll_interval_ms: u64,

    #[serde(default = "default_notification_batch")]
    #[validate(range(min = 1, max = 500))]
    pub batch_size: u64,

    /// A job left in `processing` longer than this is reclaimed
    #[serde(default = "default_notification_lease_secs")]
    #[validate(range(min = 1))]
    pub processing_lease_secs: u64,

    #[serde(default = "default_from_address")]
    pub from_address: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            max_retries: default_notification_retries(),
            retry_backoff_secs: default_notification_backoff_secs(),
            poll_interval_ms: default_notification_poll_ms(),
            batch_size: default_notification_batch(),
            processing_lease_secs: default_notification_lease_secs(),
            from_address: default_from_address(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct DeliveryConfig {
    #[serde(default = "default_delivery_pincodes")]
    pub allowed_pincodes: Vec<String>,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            allowed_pincodes: default_delivery_pincodes(),
        }
    }
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AppConfig {
    #[validate(length(min = 1))]
    pub database_url: String,

    /// HS256 signing secret shared with the identity provider
    #[validate(length(min = 32), custom = "validate_jwt_secret")]
    pub jwt_secret: String,

    #[serde(default = "default_auth_issuer")]
    pub auth_issuer: String,

    #[serde(default = "default_auth_audience")]
    pub auth_audience: String,

    /// Lifetime in seconds of tokens minted by `AuthService::issue_token`
    #[serde(default = "default_jwt_expiration")]
    #[validate(range(min = 300, max = 86400))]
    pub jwt_expiration: usize,

    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    pub environment: String,

    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_json: bool,

    #[serde(default)]
    pub auto_migrate: bool,

    /// Comma-separated list of allowed CORS origins
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    #[serde(default)]
    #[validate]
    pub payment: PaymentGatewayConfig,

    #[serde(default)]
    #[validate]
    pub notifications: NotificationConfig,

    #[serde(default)]
    pub delivery: DeliveryConfig,
}

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] ValidationErrors),
}

impl AppConfig {
    /// Creates a configuration with defaults for everything but the essentials
    pub fn new(
        database_url: String,
        jwt_secret: String,
        host: String,
        port: u16,
        environment: String,
    ) -> Self {
        Self {
            database_url,
            jwt_secret,
            auth_issuer: default_auth_issuer(),
            auth_audience: default_auth_audience(),
            jwt_expiration: default_jwt_expiration(),
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            cors_allowed_origins: None,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            payment: PaymentGatewayConfig::default(),
            notifications: NotificationConfig::default(),
            delivery: DeliveryConfig::default(),
        }
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn is_development(&self) -> bool {
        matches!(self.environment.as_str(), "development" | "test")
    }

    pub fn cors_origins(&self) -> Vec<String> {
        self.cors_allowed_origins
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(str::to_owned)
            .collect()
    }

    fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if !self.is_development() {
            if self.cors_origins().is_empty() {
                let mut err = ValidationError::new("cors_allowed_origins_required");
                err.message =
                    Some("Set APP__CORS_ALLOWED_ORIGINS for non-development environments".into());
                errors.add("cors_allowed_origins", err);
            }

            if self.payment.key_id.trim().is_empty() || self.payment.key_secret.trim().is_empty()
            {
                let mut err = ValidationError::new("payment_credentials_required");
                err.message = Some(
                    "Set APP__PAYMENT__KEY_ID and APP__PAYMENT__KEY_SECRET outside development"
                        .into(),
                );
                errors.add("payment", err);
            }
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_auth_issuer() -> String {
    "bloomhaven-auth".to_string()
}
fn default_auth_audience() -> String {
    "bloomhaven-api".to_string()
}
fn default_jwt_expiration() -> usize {
    3600
}
fn default_db_max_connections() -> u32 {
    10
}
fn default_db_min_connections() -> u32 {
    1
}
fn default_db_connect_timeout_secs() -> u64 {
    30
}
fn default_db_idle_timeout_secs() -> u64 {
    600
}
fn default_db_acquire_timeout_secs() -> u64 {
    8
}
fn default_gateway_base_url() -> String {
    DEFAULT_GATEWAY_BASE_URL.to_string()
}
fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}
fn default_gateway_timeout_secs() -> u64 {
    15
}
fn default_notification_retries() -> u32 {
    3
}
fn default_notification_backoff_secs() -> u64 {
    10
}
fn default_notification_poll_ms() -> u64 {
    1000
}
fn default_notification_batch() -> u64 {
    25
}
fn default_notification_lease_secs() -> u64 {
    300
}
fn default_from_address() -> String {
    "orders@bloomhaven.example".to_string()
}
fn default_delivery_pincodes() -> Vec<String> {
    DEFAULT_DELIVERY_PINCODES
        .iter()
        .map(|p| p.to_string())
        .collect()
}

fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

fn validate_jwt_secret(secret: &str) -> Result<(), ValidationError> {
    let trimmed = secret.trim();

    const DISALLOWED: [&str; 3] = ["changeme", "your-secret-key", "default-secret-key"];
    let lower = trimmed.to_ascii_lowercase();
    if DISALLOWED.iter().any(|bad| lower.contains(bad)) {
        let mut err = ValidationError::new("jwt_secret");
        err.message = Some("JWT secret must be overridden with a secure random value".into());
        return Err(err);
    }

    let unique_chars: std::collections::HashSet<char> = trimmed.chars().collect();
    if unique_chars.len() < 10 {
        let mut err = ValidationError::new("jwt_secret");
        err.message =
            Some("JWT secret must have at least 10 unique characters for adequate entropy".into());
        return Err(err);
    }

    Ok(())
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("bloomhaven_api={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    let filter = EnvFilter::new(filter_directive);
    if json {
        let _ = fmt().with_env_filter(filter).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter).try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. Default config (config/default.toml)
/// 3. Environment-specific config (config/{env}.toml)
/// 4. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    // jwt_secret has no default on purpose
    let config = Config::builder()
        .set_default("database_url", "sqlite://bloomhaven.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT as i64)?
        .set_default("environment", run_env.as_str())?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(
            Environment::with_prefix("APP")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("delivery.allowed_pincodes")
                .try_parsing(true),
        )
        .build()?;

    if config.get_string("jwt_secret").is_err() {
        error!("JWT secret is not configured. Set APP__JWT_SECRET to the identity provider's signing secret.");
        return Err(AppConfigError::Load(ConfigError::NotFound(
            "jwt_secret is required but not configured. Set APP__JWT_SECRET environment variable."
                .into(),
        )));
    }

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration security validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}
