use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::warn;

use crate::engine::{
    EngineConfig, ALLOWED_EXTENSIONS, DEFAULT_APPROVAL_REWARD, DEFAULT_MAX_UPLOAD_BYTES,
    DEFAULT_PAGE_SIZE, DEFAULT_POPULAR_TAG_LIMIT, DEFAULT_RECOMMENDATION_LIMIT,
    DEFAULT_REVIEW_REWARD,
};

const DEV_JWT_SECRET: &str = "dev_jwt_secret_change_me";

/// Service configuration, loaded from the environment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommunityConfig {
    pub server: ServerConfig,
    pub security: SecurityConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
    pub scanner: ScannerConfig,
    pub logging: LoggingConfig,
    pub economy: EconomyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Requests per minute per client IP
    pub rate_limit_per_minute: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection string
    pub postgres_url: String,
    /// Enable PostgreSQL (if false, uses in-memory fallback)
    pub postgres_enabled: bool,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HS256 secret for bearer tokens
    pub jwt_secret: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// clamd address; `None` disables scanning
    pub clamav_addr: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug)
    pub level: String,
    /// Enable request/response logging
    pub log_requests: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EconomyConfig {
    pub approval_reward: i64,
    pub review_reward: i64,
    pub popular_tag_limit: usize,
    pub recommendation_limit: i64,
    pub default_page_size: i64,
}

impl Default for EconomyConfig {
    fn default() -> Self {
        Self {
            approval_reward: DEFAULT_APPROVAL_REWARD,
            review_reward: DEFAULT_REVIEW_REWARD,
            popular_tag_limit: DEFAULT_POPULAR_TAG_LIMIT,
            recommendation_limit: DEFAULT_RECOMMENDATION_LIMIT,
            default_page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            postgres_url: "postgresql://localhost:5432/resource_community".to_string(),
            postgres_enabled: false,
            max_connections: 10,
        }
    }
}

impl Default for CommunityConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            security: SecurityConfig {
                rate_limit_per_minute: 120,
            },
            database: DatabaseConfig::default(),
            storage: StorageConfig {
                upload_dir: PathBuf::from("uploads"),
                max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            },
            auth: AuthConfig {
                jwt_secret: String::new(), // Must be set via environment
            },
            scanner: ScannerConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
                log_requests: false,
            },
            economy: EconomyConfig::default(),
        }
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => Ok(Some(
            raw.trim()
                .parse()
                .with_context(|| format!("Invalid {} value", key))?,
        )),
        None => Ok(None),
    }
}

impl CommunityConfig {
    /// Load configuration from environment variables and validate it
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as `from_env`, reading variables through `lookup`
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        let dev_mode = lookup("ENV").map(|v| v == "dev").unwrap_or(false);

        // Server
        if let Some(host) = lookup("SERVER_HOST") {
            config.server.host = host;
        }
        if let Some(port) = parse_var(&lookup, "SERVER_PORT")? {
            config.server.port = port;
        }
        if let Some(limit) = parse_var(&lookup, "RATE_LIMIT_PER_MINUTE")? {
            config.security.rate_limit_per_minute = limit;
        }

        // Database
        if let Some(url) = lookup("DATABASE_URL") {
            config.database.postgres_url = url;
        }
        if let Some(enabled) = parse_var(&lookup, "POSTGRES_ENABLED")? {
            config.database.postgres_enabled = enabled;
        }
        if let Some(max) = parse_var(&lookup, "DATABASE_MAX_CONNECTIONS")? {
            config.database.max_connections = max;
        }

        // Storage
        if let Some(dir) = lookup("UPLOAD_DIR") {
            config.storage.upload_dir = PathBuf::from(dir);
        }
        if let Some(max) = parse_var(&lookup, "MAX_UPLOAD_BYTES")? {
            config.storage.max_upload_bytes = max;
        }

        // Auth
        config.auth.jwt_secret = match lookup("JWT_SECRET").filter(|s| !s.is_empty()) {
            Some(secret) => secret,
            None if dev_mode => {
                warn!("JWT_SECRET not set, using development secret (ENV=dev)");
                DEV_JWT_SECRET.to_string()
            }
            None => String::new(),
        };

        // Scanner
        config.scanner.clamav_addr = lookup("CLAMAV_ADDR").filter(|a| !a.trim().is_empty());

        // Logging
        if let Some(level) = lookup("LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Some(log_requests) = parse_var(&lookup, "LOG_REQUESTS")? {
            config.logging.log_requests = log_requests;
        }

        // Economy
        if let Some(reward) = parse_var(&lookup, "APPROVAL_REWARD")? {
            config.economy.approval_reward = reward;
        }
        if let Some(reward) = parse_var(&lookup, "REVIEW_REWARD")? {
            config.economy.review_reward = reward;
        }
        if let Some(limit) = parse_var(&lookup, "POPULAR_TAG_LIMIT")? {
            config.economy.popular_tag_limit = limit;
        }
        if let Some(limit) = parse_var(&lookup, "RECOMMENDATION_LIMIT")? {
            config.economy.recommendation_limit = limit;
        }
        if let Some(size) = parse_var(&lookup, "DEFAULT_PAGE_SIZE")? {
            config.economy.default_page_size = size;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration for security and consistency
    pub fn validate(&self) -> Result<()> {
        if self.server.host.is_empty() {
            return Err(anyhow::anyhow!("Server host cannot be empty"));
        }
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port must be non-zero"));
        }
        if self.auth.jwt_secret.is_empty() {
            return Err(anyhow::anyhow!(
                "JWT_SECRET is required (set ENV=dev to use a development secret)"
            ));
        }
        if self.database.postgres_enabled && self.database.postgres_url.is_empty() {
            return Err(anyhow::anyhow!("DATABASE_URL is required when POSTGRES_ENABLED=true"));
        }
        if self.database.max_connections == 0 {
            return Err(anyhow::anyhow!("DATABASE_MAX_CONNECTIONS must be non-zero"));
        }
        if self.storage.max_upload_bytes == 0 {
            return Err(anyhow::anyhow!("MAX_UPLOAD_BYTES must be non-zero"));
        }
        if self.economy.approval_reward < 0 || self.economy.review_reward < 0 {
            return Err(anyhow::anyhow!("Rewards cannot be negative"));
        }
        if self.economy.default_page_size <= 0 {
            return Err(anyhow::anyhow!("DEFAULT_PAGE_SIZE must be positive"));
        }
        if self.economy.recommendation_limit < 0 {
            return Err(anyhow::anyhow!("RECOMMENDATION_LIMIT cannot be negative"));
        }
        Ok(())
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            approval_reward: self.economy.approval_reward,
            review_reward: self.economy.review_reward,
            popular_tag_limit: self.economy.popular_tag_limit,
            recommendation_limit: self.economy.recommendation_limit,
            default_page_size: self.economy.default_page_size,
            max_upload_bytes: self.storage.max_upload_bytes,
            allowed_extensions: ALLOWED_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        }
    }
}

/// Mask the password component of a connection string
pub fn sanitize_dsn(dsn: &str) -> String {
    let Some((scheme, rest)) = dsn.split_once("://") else {
        return dsn.to_string();
    };
    let Some((credentials, host)) = rest.rsplit_once('@') else {
        return dsn.to_string();
    };
    match credentials.split_once(':') {
        Some((user, _password)) => format!("{}://{}:***@{}", scheme, user, host),
        None => dsn.to_string(),
    }
}
