use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the pool, the manager and the drivers behind them.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("Connection open error: {0}")]
    ConnectionOpen(String),
    #[error("Timed out after {0:?} waiting for a connection")]
    Timeout(Duration),
    #[error("Connection pool is closed")]
    PoolClosed,
    #[error("Query error: {0}")]
    Query(String),
    #[error("Update error: {0}")]
    Update(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Value error: {0}")]
    Value(String),
    #[error("Database error: {0}")]
    Database(String),
}

pub type DbResult<T> = Result<T, DbError>;

impl DbError {
    /// Whether the error came from pool checkout rather than statement execution.
    pub fn is_pool_error(&self) -> bool {
        matches!(
            self,
            DbError::ConnectionOpen(_) | DbError::Timeout(_) | DbError::PoolClosed
        )
    }

    pub(crate) fn into_query(self) -> Self {
        match self {
            DbError::Database(msg) => DbError::Query(msg),
            other => other,
        }
    }

    pub(crate) fn into_update(self) -> Self {
        match self {
            DbError::Database(msg) | DbError::Query(msg) => DbError::Update(msg),
            other => other,
        }
    }
}

impl serde::de::Error for DbError {
    fn custom<T: std::fmt::Display>(msg: T) -> Self {
        DbError::Value(msg.to_string())
    }
}

impl serde::ser::Error for DbError {
    fn custom<T: std::fmt::Display>(msg: T) -> Self {
        DbError::Value(msg.to_string())
    }
}

#[cfg(feature = "mysql")]
impl From<mysql_async::Error> for DbError {
    fn from(e: mysql_async::Error) -> Self {
        DbError::Database(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_error_classification() {
        assert!(DbError::PoolClosed.is_pool_error());
        assert!(DbError::Timeout(Duration::from_millis(200)).is_pool_error());
        assert!(DbError::ConnectionOpen("refused".into()).is_pool_error());
        assert!(!DbError::Query("syntax".into()).is_pool_error());
        assert!(!DbError::Update("duplicate key".into()).is_pool_error());
    }

    #[test]
    fn test_driver_errors_are_reclassified() {
        assert!(matches!(
            DbError::Database("syntax".into()).into_query(),
            DbError::Query(msg) if msg == "syntax"
        ));
        assert!(matches!(
            DbError::Database("duplicate key".into()).into_update(),
            DbError::Update(_)
        ));
        assert!(matches!(DbError::PoolClosed.into_update(), DbError::PoolClosed));
    }

    #[test]
    fn test_display() {
        let e = DbError::Timeout(Duration::from_secs(1));
        assert_eq!(e.to_string(), "Timed out after 1s waiting for a connection");
        assert_eq!(DbError::PoolClosed.to_string(), "Connection pool is closed");
    }
}
