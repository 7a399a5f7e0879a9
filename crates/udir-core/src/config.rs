//! udir Configuration Management
//!
//! Handles configuration from environment variables and TOML files
//! with sensible defaults for development.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Signing secret used when none is configured. Startup warns when it is in use.
pub const DEVELOPMENT_SECRET: &str = "development-secret-key-change-in-production";

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,

    /// Token and password settings
    pub auth: AuthConfig,

    /// User directory gateway settings
    pub directory: DirectoryConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path,
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Merge with environment variables (env takes precedence)
    pub fn with_env_override(mut self) -> Result<Self, ConfigError> {
        self.apply_env()?;
        self.validate()?;
        Ok(self)
    }

    /// Overwrite each setting whose environment variable is present
    fn apply_env(&mut self) -> Result<(), ConfigError> {
        // Server
        if let Ok(host) = std::env::var("API_HOST") {
            self.server.host = host;
        }
        if let Some(port) = parse_env("API_PORT")? {
            self.server.port = port;
        }

        // Tokens
        if let Ok(secret) = std::env::var("JWT_SECRET") {
            self.auth.jwt_secret = secret;
        }
        if let Ok(algorithm) = std::env::var("JWT_ALGORITHM") {
            self.auth.jwt_algorithm = algorithm;
        }
        if let Ok(issuer) = std::env::var("JWT_ISSUER") {
            self.auth.issuer = issuer;
        }
        if let Some(ttl) = parse_env("SESSION_TTL_SECS")? {
            self.auth.session_ttl_secs = ttl;
        }
        if let Some(ttl) = parse_env("RECOVERY_TTL_SECS")? {
            self.auth.recovery_ttl_secs = ttl;
        }
        if let Some(single_use) = parse_env("SINGLE_USE_RECOVERY")? {
            self.auth.single_use_recovery = single_use;
        }

        // Password hashing
        if let Some(memory) = parse_env("PASSWORD_MEMORY_COST")? {
            self.auth.password_memory_cost = memory;
        }
        if let Some(time) = parse_env("PASSWORD_TIME_COST")? {
            self.auth.password_time_cost = time;
        }
        if let Some(parallelism) = parse_env("PASSWORD_PARALLELISM")? {
            self.auth.password_parallelism = parallelism;
        }

        // Directory
        if let Some(timeout) = parse_env("DIRECTORY_TIMEOUT_MS")? {
            self.directory.timeout_ms = timeout;
        }

        // Logging
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(json) = parse_env("LOG_JSON")? {
            self.logging.json_format = json;
        }

        Ok(())
    }

    /// Reject values that would make the service unusable
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.jwt_secret.is_empty() {
            return Err(ConfigError::MissingRequired("JWT_SECRET".to_string()));
        }
        if self.auth.session_ttl_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "SESSION_TTL_SECS".to_string(),
                value: "0".to_string(),
            });
        }
        if self.auth.recovery_ttl_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "RECOVERY_TTL_SECS".to_string(),
                value: "0".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value,
            }),
        Err(_) => Ok(None),
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
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Token issuance and credential hashing settings
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HMAC signing secret, loaded once at startup
    pub jwt_secret: String,

    /// Signature algorithm name (HS256, HS384, HS512)
    pub jwt_algorithm: String,

    /// Token issuer identifier
    pub issuer: String,

    /// Session token lifetime in seconds
    pub session_ttl_secs: u64,

    /// Recovery token lifetime in seconds
    pub recovery_ttl_secs: u64,

    /// Reject a recovery token after its first successful reset
    pub single_use_recovery: bool,

    /// Argon2 memory cost in KiB
    pub password_memory_cost: u32,

    /// Argon2 iterations
    pub password_time_cost: u32,

    /// Argon2 lanes
    pub password_parallelism: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: DEVELOPMENT_SECRET.to_string(),
            jwt_algorithm: "HS256".to_string(),
            issuer: "udir-api".to_string(),
            session_ttl_secs: 30 * 60,
            recovery_ttl_secs: 15 * 60,
            single_use_recovery: true,
            password_memory_cost: 65536, // 64 MB
            password_time_cost: 3,
            password_parallelism: 4,
        }
    }
}

impl AuthConfig {
    /// True when the built-in development secret is still in use
    pub fn uses_development_secret(&self) -> bool {
        self.jwt_secret == DEVELOPMENT_SECRET
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"<redacted>")
            .field("jwt_algorithm", &self.jwt_algorithm)
            .field("issuer", &self.issuer)
            .field("session_ttl_secs", &self.session_ttl_secs)
            .field("recovery_ttl_secs", &self.recovery_ttl_secs)
            .field("single_use_recovery", &self.single_use_recovery)
            .field("password_memory_cost", &self.password_memory_cost)
            .field("password_time_cost", &self.password_time_cost)
            .field("password_parallelism", &self.password_parallelism)
            .finish()
    }
}

/// User directory gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    /// Upper bound for a single gateway call, in milliseconds
    pub timeout_ms: u64,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self { timeout_ms: 2000 }
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

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Serializes tests that touch process environment
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    /// Run `f` with `vars` set, removing them afterwards
    fn with_env<R>(vars: &[(&str, &str)], f: impl FnOnce() -> R) -> R {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        for (key, value) in vars {
            std::env::set_var(key, value);
        }
        let result = f();
        for (key, _) in vars {
            std::env::remove_var(key);
        }
        result
    }

    fn from_file_contents() -> AppConfig {
        toml::from_str(
            r#"
            [server]
            host = "10.0.0.5"
            port = 9000

            [auth]
            jwt_secret = "from-file"
            session_ttl_secs = 600
            single_use_recovery = true

            [directory]
            timeout_ms = 250

            [logging]
            level = "warn"
            "#,
        )
        .unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.auth.session_ttl_secs, 1800);
        assert_eq!(config.auth.recovery_ttl_secs, 900);
        assert!(config.auth.single_use_recovery);
        assert!(config.auth.uses_development_secret());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_debug_hides_secret() {
        let config = AuthConfig {
            jwt_secret: "super-secret-value".to_string(),
            ..Default::default()
        };
        let printed = format!("{config:?}");
        assert!(!printed.contains("super-secret-value"));
    }

    #[test]
    fn test_partial_toml() {
        let config: AppConfig = toml::from_str(
            r#"
            [auth]
            jwt_secret = "from-file"
            session_ttl_secs = 600

            [directory]
            timeout_ms = 250
            "#,
        )
        .unwrap();

        assert_eq!(config.auth.jwt_secret, "from-file");
        assert_eq!(config.auth.session_ttl_secs, 600);
        assert_eq!(config.auth.recovery_ttl_secs, 900);
        assert_eq!(config.directory.timeout_ms, 250);
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_validate_rejects_empty_secret() {
        let mut config = AppConfig::default();
        config.auth.jwt_secret = String::new();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingRequired(_))
        ));
    }

    #[test]
    fn test_validate_rejects_zero_ttl() {
        let mut config = AppConfig::default();
        config.auth.recovery_ttl_secs = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_env_override_server() {
        let config = with_env(&[("API_HOST", "127.0.0.1"), ("API_PORT", "8181")], || {
            from_file_contents().with_env_override().unwrap()
        });
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8181);
    }

    #[test]
    fn test_env_override_tokens() {
        let config = with_env(
            &[
                ("JWT_SECRET", "from-env"),
                ("JWT_ALGORITHM", "HS512"),
                ("JWT_ISSUER", "udir-test"),
                ("SESSION_TTL_SECS", "60"),
                ("RECOVERY_TTL_SECS", "120"),
                ("SINGLE_USE_RECOVERY", "false"),
            ],
            || from_file_contents().with_env_override().unwrap(),
        );
        assert_eq!(config.auth.jwt_secret, "from-env");
        assert_eq!(config.auth.jwt_algorithm, "HS512");
        assert_eq!(config.auth.issuer, "udir-test");
        assert_eq!(config.auth.session_ttl_secs, 60);
        assert_eq!(config.auth.recovery_ttl_secs, 120);
        assert!(!config.auth.single_use_recovery);
    }

    #[test]
    fn test_env_override_password_costs() {
        let config = with_env(
            &[
                ("PASSWORD_MEMORY_COST", "8192"),
                ("PASSWORD_TIME_COST", "2"),
                ("PASSWORD_PARALLELISM", "1"),
            ],
            || from_file_contents().with_env_override().unwrap(),
        );
        assert_eq!(config.auth.password_memory_cost, 8192);
        assert_eq!(config.auth.password_time_cost, 2);
        assert_eq!(config.auth.password_parallelism, 1);
    }

    #[test]
    fn test_env_override_directory_and_logging() {
        let config = with_env(
            &[
                ("DIRECTORY_TIMEOUT_MS", "75"),
                ("LOG_LEVEL", "debug"),
                ("LOG_JSON", "true"),
            ],
            || from_file_contents().with_env_override().unwrap(),
        );
        assert_eq!(config.directory.timeout_ms, 75);
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json_format);
    }

    #[test]
    fn test_env_override_keeps_file_values_when_unset() {
        let config = with_env(&[], || from_file_contents().with_env_override().unwrap());
        assert_eq!(config.server.host, "10.0.0.5");
        assert_eq!(config.auth.jwt_secret, "from-file");
        assert_eq!(config.auth.session_ttl_secs, 600);
        assert_eq!(config.directory.timeout_ms, 250);
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn test_env_override_rejects_unparseable_value() {
        let result = with_env(&[("SESSION_TTL_SECS", "soon")], || {
            from_file_contents().with_env_override()
        });
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "SESSION_TTL_SECS"
        ));
    }

    #[test]
    fn test_from_env_applies_variables() {
        let config = with_env(&[("SESSION_TTL_SECS", "60")], AppConfig::from_env).unwrap();
        assert_eq!(config.auth.session_ttl_secs, 60);
        assert_eq!(config.auth.recovery_ttl_secs, 900);
    }
}
