use crate::error::DbError;
use crate::models::db_config::DatabaseConfig;
use crate::udbc::DEFAULT_DB_NAME;
use crate::udbc::connection::Connection;
use crate::udbc::driver::Driver;
use crate::udbc_mysql::connection::MysqlConnection;
use async_trait::async_trait;
use mysql_async::{Conn, Opts, OptsBuilder};
use tracing::debug;

const MYSQL_TYPE: &str = "mysql";

/// Opens standalone `mysql_async` sessions; pooling is done by
/// [`crate::pool::ConnectionPool`], not by `mysql_async` itself.
pub struct MysqlDriver {
    name: String,
    opts: Opts,
}

impl MysqlDriver {
    pub fn new(config: &DatabaseConfig) -> Result<Self, DbError> {
        if config.charset.is_empty()
            || !config
                .charset
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(DbError::Config(format!("Invalid charset: {}", config.charset)));
        }

        // extra parameters go through the URL parser so unknown keys are rejected here
        let builder = if config.extra.is_empty() {
            OptsBuilder::default()
        } else {
            let query = config
                .extra
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join("&");
            let opts = Opts::from_url(&format!("mysql://localhost/?{}", query))
                .map_err(|e| DbError::Config(e.to_string()))?;
            OptsBuilder::from_opts(opts)
        };

        let builder = builder
            .ip_or_hostname(config.host.clone())
            .tcp_port(config.port)
            .user(Some(config.user.clone()))
            .pass(Some(config.password.clone()))
            .db_name(Some(config.database.clone()))
            .init(vec![
                format!("SET NAMES {}", config.charset),
                "SET autocommit=0".to_string(),
            ]);

        Ok(Self {
            name: DEFAULT_DB_NAME.to_string(),
            opts: Opts::from(builder),
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

#[async_trait]
impl Driver for MysqlDriver {
    fn name(&self) -> &str {
        &self.name
    }

    fn r#type(&self) -> &str {
        MYSQL_TYPE
    }

    async fn connect(&self) -> Result<Box<dyn Connection>, DbError> {
        let conn = Conn::new(self.opts.clone())
            .await
            .map_err(|e| DbError::ConnectionOpen(e.to_string()))?;
        debug!("opened mysql connection: db={}, conn_id={}", self.name, conn.id());
        Ok(Box::new(MysqlConnection::new(conn)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_bad_charset() {
        let config = DatabaseConfig::default().with_charset("utf8; DROP TABLE users");
        assert!(matches!(MysqlDriver::new(&config), Err(DbError::Config(_))));
    }

    #[test]
    fn test_rejects_unknown_param() {
        let config = DatabaseConfig::default().with_param("no_such_option", "1");
        assert!(matches!(MysqlDriver::new(&config), Err(DbError::Config(_))));
    }

    #[test]
    fn test_builds_opts() {
        let config = DatabaseConfig::new("db.internal", "rbac")
            .with_port(13306)
            .with_param("stmt_cache_size", "16");
        let driver = MysqlDriver::new(&config).unwrap().with_name("main");
        assert_eq!(driver.name(), "main");
        assert_eq!(driver.opts.ip_or_hostname(), "db.internal");
        assert_eq!(driver.opts.tcp_port(), 13306);
        assert_eq!(driver.opts.db_name(), Some("rbac"));
        assert_eq!(driver.opts.stmt_cache_size(), 16);
    }
}
