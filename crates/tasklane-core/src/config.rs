//! Tasklane Configuration Management
//!
//! Configuration comes from an optional TOML file (`TASKLANE_CONFIG`) overlaid
//! with environment variables. Every section has development defaults, so an
//! empty environment yields a runnable in-memory server.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Environment variable naming the TOML config file
pub const CONFIG_PATH_ENV: &str = "TASKLANE_CONFIG";

/// Minimum accepted length of an externally supplied signing secret
pub const MIN_SECRET_LEN: usize = 32;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,

    /// Document store selection and connection
    pub database: DatabaseConfig,

    /// Timeout and retry policy for store calls
    pub store: StoreConfig,

    /// Token lifetimes and signing
    pub auth: AuthConfig,

    /// Argon2 cost parameters
    pub password: PasswordConfig,

    /// Login rate limiting
    pub rate_limit: RateLimitConfig,

    /// Logout blacklist bounds
    pub revocation: RevocationConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration the way the server binary does: file named by
    /// `TASKLANE_CONFIG` if set, environment on top, then validated.
    pub fn load() -> Result<Self, ConfigError> {
        let config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::from_file(path)?.with_env_override()?,
            Err(_) => Self::from_env()?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_override()
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path,
            message: e.to_string(),
        })
    }

    /// Overlay environment variables (env takes precedence)
    pub fn with_env_override(mut self) -> Result<Self, ConfigError> {
        // Server
        if let Some(host) = env_string("API_HOST") {
            self.server.host = host;
        }
        if let Some(port) = env_parse("API_PORT")? {
            self.server.port = port;
        }
        if let Some(origins) = env_string("CORS_ORIGINS") {
            self.server.cors_origins = origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        if let Some(proxies) = env_string("TRUSTED_PROXIES") {
            self.server.trusted_proxies = proxies
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| s.parse().map_err(|_| invalid("TRUSTED_PROXIES", s)))
                .collect::<Result<_, _>>()?;
        }

        // Store backend
        if let Some(backend) = env_parse("STORE_BACKEND")? {
            self.database.backend = backend;
        }
        if let Some(url) = env_string("SURREALDB_URL") {
            self.database.surrealdb_url = url;
        }
        if let Some(user) = env_string("SURREALDB_USER") {
            self.database.surrealdb_user = user;
        }
        if let Some(pass) = env_string("SURREALDB_PASS") {
            self.database.surrealdb_pass = pass;
        }
        if let Some(ns) = env_string("SURREALDB_NAMESPACE") {
            self.database.surrealdb_namespace = ns;
        }
        if let Some(db) = env_string("SURREALDB_DATABASE") {
            self.database.surrealdb_database = db;
        }
        if let Some(ms) = env_parse("STORE_TIMEOUT_MS")? {
            self.store.timeout_ms = ms;
        }
        if let Some(retries) = env_parse("STORE_MAX_RETRIES")? {
            self.store.max_retries = retries;
        }

        // Tokens. The secret is always taken from the environment when present.
        if let Some(secret) = env_string("JWT_SECRET") {
            self.auth.jwt_secret = Some(secret);
        }
        if let Some(issuer) = env_string("JWT_ISSUER") {
            self.auth.issuer = issuer;
        }
        if let Some(ttl) = env_parse("ACCESS_TOKEN_TTL_SECS")? {
            self.auth.access_token_ttl_secs = ttl;
        }
        if let Some(ttl) = env_parse("REFRESH_TOKEN_TTL_SECS")? {
            self.auth.refresh_token_ttl_secs = ttl;
        }

        // Login throttling
        if let Some(capacity) = env_parse("LOGIN_RATE_CAPACITY")? {
            self.rate_limit.capacity = capacity;
        }
        if let Some(refill) = env_parse("LOGIN_RATE_REFILL")? {
            self.rate_limit.refill_tokens = refill;
        }
        if let Some(period) = env_parse("LOGIN_RATE_PERIOD_SECS")? {
            self.rate_limit.refill_period_secs = period;
        }

        // Blacklist
        if let Some(max) = env_parse("REVOCATION_MAX_ENTRIES")? {
            self.revocation.max_entries = max;
        }
        if let Some(ttl) = env_parse("REVOCATION_TTL_SECS")? {
            self.revocation.ttl_secs = Some(ttl);
        }

        // Logging
        if let Some(level) = env_string("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(json) = env_parse("LOG_JSON")? {
            self.logging.json_format = json;
        }

        Ok(self)
    }

    /// Reject combinations that would break token or limiter semantics
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.access_token_ttl_secs == 0 {
            return Err(invalid("auth.access_token_ttl_secs", "0"));
        }
        if self.auth.refresh_token_ttl_secs <= self.auth.access_token_ttl_secs {
            return Err(invalid(
                "auth.refresh_token_ttl_secs",
                self.auth.refresh_token_ttl_secs.to_string(),
            ));
        }
        if let Some(secret) = &self.auth.jwt_secret {
            if secret.len() < MIN_SECRET_LEN {
                return Err(invalid("auth.jwt_secret", "<too short>"));
            }
        }
        if self.rate_limit.capacity == 0 {
            return Err(invalid("rate_limit.capacity", "0"));
        }
        if self.rate_limit.refill_tokens == 0 {
            return Err(invalid("rate_limit.refill_tokens", "0"));
        }
        if self.rate_limit.refill_period_secs == 0 {
            return Err(invalid("rate_limit.refill_period_secs", "0"));
        }
        if self.revocation.max_entries == 0 {
            return Err(invalid("revocation.max_entries", "0"));
        }
        if let Some(ttl) = self.revocation.ttl_secs {
            // Entries must outlive every token they shadow.
            if ttl < self.auth.access_token_ttl_secs {
                return Err(invalid("revocation.ttl_secs", ttl.to_string()));
            }
        }
        if self.store.timeout_ms == 0 {
            return Err(invalid("store.timeout_ms", "0"));
        }
        if self.store.backoff_multiplier < 1.0 {
            return Err(invalid(
                "store.backoff_multiplier",
                self.store.backoff_multiplier.to_string(),
            ));
        }
        if self.housekeeping_interval().is_zero() {
            return Err(invalid("auth.housekeeping_interval_secs", "0"));
        }
        Ok(())
    }

    /// Lifetime of blacklist entries
    pub fn revocation_ttl(&self) -> Duration {
        let ttl = self
            .revocation
            .ttl_secs
            .unwrap_or(self.auth.access_token_ttl_secs)
            .max(self.auth.access_token_ttl_secs);
        Duration::from_secs(ttl)
    }

    /// Interval of the background sweep
    pub fn housekeeping_interval(&self) -> Duration {
        Duration::from_secs(self.auth.housekeeping_interval_secs)
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_parse<T: FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match env_string(key) {
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value,
            }),
        None => Ok(None),
    }
}

fn invalid(key: &str, value: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.into(),
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Request timeout in seconds
    pub request_timeout_secs: u64,

    /// Allowed origins for CORS
    pub cors_origins: Vec<String>,

    /// Reverse proxies whose X-Forwarded-For / X-Real-IP headers are honoured.
    /// Requests from any other peer are keyed by the socket address alone.
    pub trusted_proxies: Vec<IpAddr>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            request_timeout_secs: 30,
            // Empty by default - set via CORS_ORIGINS env var
            cors_origins: vec![],
            trusted_proxies: vec![],
        }
    }
}

/// Which document store backs the service
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    SurrealDb,
}

impl FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "surrealdb" => Ok(Self::SurrealDb),
            _ => Err(ConfigError::InvalidValue {
                key: "STORE_BACKEND".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Database connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Selected backend
    pub backend: StoreBackend,

    /// SurrealDB WebSocket URL
    pub surrealdb_url: String,

    /// SurrealDB username
    pub surrealdb_user: String,

    /// SurrealDB password
    pub surrealdb_pass: String,

    /// SurrealDB namespace
    pub surrealdb_namespace: String,

    /// SurrealDB database name
    pub surrealdb_database: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            surrealdb_url: "ws://localhost:8000".to_string(),
            surrealdb_user: "root".to_string(),
            surrealdb_pass: "root".to_string(),
            surrealdb_namespace: "tasklane".to_string(),
            surrealdb_database: "app".to_string(),
        }
    }
}

/// Store call timeout and retry policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Per-attempt timeout in milliseconds
    pub timeout_ms: u64,

    /// Retries after the first attempt (idempotent calls only)
    pub max_retries: u32,

    /// Delay before the first retry
    pub base_delay_ms: u64,

    /// Upper bound on any single delay
    pub max_delay_ms: u64,

    /// Growth factor between retries
    pub backoff_multiplier: f64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 2_000,
            max_retries: 3,
            base_delay_ms: 50,
            max_delay_ms: 1_000,
            backoff_multiplier: 2.0,
        }
    }
}

/// Token lifetimes and signing
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Access token lifetime in seconds
    pub access_token_ttl_secs: u64,

    /// Refresh token lifetime in seconds
    pub refresh_token_ttl_secs: u64,

    /// HMAC secret; a random per-process key is generated when absent
    #[serde(skip_serializing)]
    pub jwt_secret: Option<String>,

    /// `iss` claim
    pub issuer: String,

    /// Interval of the background sweep in seconds
    pub housekeeping_interval_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            access_token_ttl_secs: 900,
            refresh_token_ttl_secs: 7 * 24 * 3600,
            jwt_secret: None,
            issuer: "tasklane".to_string(),
            housekeeping_interval_secs: 60,
        }
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("access_token_ttl_secs", &self.access_token_ttl_secs)
            .field("refresh_token_ttl_secs", &self.refresh_token_ttl_secs)
            .field(
                "jwt_secret",
                &self.jwt_secret.as_ref().map(|_| "<redacted>"),
            )
            .field("issuer", &self.issuer)
            .field("housekeeping_interval_secs", &self.housekeeping_interval_secs)
            .finish()
    }
}

/// Argon2id cost parameters
///
/// Increasing memory or iterations slows hashing for attackers and for us.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PasswordConfig {
    /// Memory cost in KiB (default: 65536 = 64 MB)
    pub memory_cost: u32,
    /// Iterations
    pub time_cost: u32,
    /// Lanes
    pub parallelism: u32,
    /// Output length in bytes
    pub output_len: usize,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            memory_cost: 65536,
            time_cost: 3,
            parallelism: 4,
            output_len: 32,
        }
    }
}

/// Greedy token bucket for login attempts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Bucket size
    pub capacity: u32,

    /// Tokens restored per period
    pub refill_tokens: u32,

    /// Refill period in seconds
    pub refill_period_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: 5,
            refill_tokens: 5,
            refill_period_secs: 60,
        }
    }
}

/// Logout blacklist bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RevocationConfig {
    /// Maximum number of revoked tokens held at once
    pub max_entries: u64,

    /// Entry lifetime; defaults to the access token lifetime
    pub ttl_secs: Option<u64>,
}

impl Default for RevocationConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            ttl_secs: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}
