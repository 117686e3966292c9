use crate::error::DbError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Connection settings for one database target.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub charset: String,
    /// Extra driver parameters, passed through to the driver untouched.
    pub extra: BTreeMap<String, String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 3306,
            user: "root".to_string(),
            password: String::new(),
            database: "rbac_system".to_string(),
            charset: "utf8mb4".to_string(),
            extra: BTreeMap::new(),
        }
    }
}

impl DatabaseConfig {
    pub fn new(host: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            database: database.into(),
            ..Default::default()
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = user.into();
        self.password = password.into();
        self
    }

    pub fn with_charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = charset.into();
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Reads `DB_HOST`, `DB_PORT`, `DB_USER`, `DB_PASSWORD`, `DB_NAME` and
    /// `DB_CHARSET`, keeping the default for anything unset.
    pub fn from_env() -> Result<Self, DbError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, DbError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Ok(Self {
            host: lookup("DB_HOST").unwrap_or(defaults.host),
            port: parse_var(&lookup, "DB_PORT")?.unwrap_or(defaults.port),
            user: lookup("DB_USER").unwrap_or(defaults.user),
            password: lookup("DB_PASSWORD").unwrap_or(defaults.password),
            database: lookup("DB_NAME").unwrap_or(defaults.database),
            charset: lookup("DB_CHARSET").unwrap_or(defaults.charset),
            extra: defaults.extra,
        })
    }
}

/// Sizing and timing knobs of a connection pool.
impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***")
            .field("database", &self.database)
            .field("charset", &self.charset)
            .field("extra", &self.extra)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolOptions {
    pub min_connections: usize,
    pub max_connections: usize,
    /// Idle connections unused for longer than this are closed instead of reused.
    pub max_idle_time: Duration,
    pub acquire_timeout: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            min_connections: 5,
            max_connections: 20,
            max_idle_time: Duration::from_secs(3600),
            acquire_timeout: Duration::from_secs(30),
        }
    }
}

impl PoolOptions {
    pub fn new(min_connections: usize, max_connections: usize) -> Self {
        Self {
            min_connections,
            max_connections,
            ..Default::default()
        }
    }

    pub fn max_idle_time(mut self, max_idle_time: Duration) -> Self {
        self.max_idle_time = max_idle_time;
        self
    }

    pub fn acquire_timeout(mut self, acquire_timeout: Duration) -> Self {
        self.acquire_timeout = acquire_timeout;
        self
    }

    pub fn validate(&self) -> Result<(), DbError> {
        if self.max_connections == 0 {
            return Err(DbError::Config(
                "max_connections must be greater than 0".to_string(),
            ));
        }
        if self.min_connections > self.max_connections {
            return Err(DbError::Config(format!(
                "min_connections ({}) cannot be greater than max_connections ({})",
                self.min_connections, self.max_connections
            )));
        }
        Ok(())
    }

    /// Reads `DB_MIN_CONNECTIONS`, `DB_MAX_CONNECTIONS`,
    /// `DB_MAX_IDLE_TIME_SECONDS` and `DB_ACQUIRE_TIMEOUT_SECONDS`.
    pub fn from_env() -> Result<Self, DbError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, DbError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let options = Self {
            min_connections: parse_var(&lookup, "DB_MIN_CONNECTIONS")?
                .unwrap_or(defaults.min_connections),
            max_connections: parse_var(&lookup, "DB_MAX_CONNECTIONS")?
                .unwrap_or(defaults.max_connections),
            max_idle_time: parse_var(&lookup, "DB_MAX_IDLE_TIME_SECONDS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.max_idle_time),
            acquire_timeout: parse_var(&lookup, "DB_ACQUIRE_TIMEOUT_SECONDS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.acquire_timeout),
        };
        options.validate()?;
        Ok(options)
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> Result<Option<T>, DbError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| DbError::Config(format!("Invalid {}: {}", key, raw))),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_debug_hides_password() {
        let config = DatabaseConfig::default().with_credentials("admin", "s3cr3t-pw");
        let printed = format!("{:?}", config);
        assert!(!printed.contains("s3cr3t-pw"));
        assert!(printed.contains("admin"));
        assert!(printed.contains("password: \"***\""));
    }

    #[test]
    fn test_defaults() {
        let config = DatabaseConfig::default();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 3306);
        assert_eq!(config.database, "rbac_system");
        assert_eq!(config.charset, "utf8mb4");
        assert!(config.extra.is_empty());
    }

    #[test]
    fn test_builder() {
        let config = DatabaseConfig::new("db.internal", "rbac")
            .with_port(13306)
            .with_credentials("admin", "secret")
            .with_param("stmt_cache_size", "0");
        assert_eq!(config.port, 13306);
        assert_eq!(config.user, "admin");
        assert_eq!(config.extra.get("stmt_cache_size").map(String::as_str), Some("0"));
    }

    #[test]
    fn test_config_from_lookup() {
        let config = DatabaseConfig::from_lookup(lookup_from(&[
            ("DB_HOST", "10.0.0.5"),
            ("DB_PORT", "3307"),
            ("DB_NAME", "rbac_test"),
        ]))
        .unwrap();
        assert_eq!(config.host, "10.0.0.5");
        assert_eq!(config.port, 3307);
        assert_eq!(config.database, "rbac_test");
        assert_eq!(config.user, "root");
    }

    #[test]
    fn test_config_invalid_port() {
        let err = DatabaseConfig::from_lookup(lookup_from(&[("DB_PORT", "not-a-port")]))
            .unwrap_err();
        assert!(matches!(err, DbError::Config(_)));
    }

    #[test]
    fn test_pool_options_validate() {
        assert!(PoolOptions::new(2, 3).validate().is_ok());
        assert!(PoolOptions::new(0, 1).validate().is_ok());
        assert!(matches!(
            PoolOptions::new(4, 3).validate(),
            Err(DbError::Config(_))
        ));
        assert!(matches!(
            PoolOptions::new(0, 0).validate(),
            Err(DbError::Config(_))
        ));
    }

    #[test]
    fn test_pool_options_from_lookup() {
        let options = PoolOptions::from_lookup(lookup_from(&[
            ("DB_MIN_CONNECTIONS", "1"),
            ("DB_MAX_CONNECTIONS", "4"),
            ("DB_ACQUIRE_TIMEOUT_SECONDS", "2"),
        ]))
        .unwrap();
        assert_eq!(options.min_connections, 1);
        assert_eq!(options.max_connections, 4);
        assert_eq!(options.acquire_timeout, Duration::from_secs(2));
        assert_eq!(options.max_idle_time, Duration::from_secs(3600));

        let err = PoolOptions::from_lookup(lookup_from(&[
            ("DB_MIN_CONNECTIONS", "8"),
            ("DB_MAX_CONNECTIONS", "4"),
        ]))
        .unwrap_err();
        assert!(matches!(err, DbError::Config(_)));
    }
}
