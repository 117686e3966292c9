use crate::error::DbError;
use crate::models::db_config::{DatabaseConfig, PoolOptions};
use crate::pool::{ConnectionPool, PoolStats, PooledConnection};
use crate::transaction::Transaction;
use crate::udbc::deserializer::from_row;
use crate::udbc::params::Params;
use crate::udbc::value::Row;
use futures::future::BoxFuture;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Pool statistics plus the target they belong to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManagerStats {
    pub pool: PoolStats,
    pub host: String,
    pub port: u16,
    pub database: String,
}

/// Entry point for running SQL through a [`ConnectionPool`].
///
/// Every operation checks out one connection and hands it back before
/// returning, on success and on failure alike. Cloning is cheap and shares
/// the pool.
#[derive(Clone)]
pub struct DatabaseManager {
    config: Arc<DatabaseConfig>,
    pool: ConnectionPool,
}

impl DatabaseManager {
    pub fn new(config: DatabaseConfig, pool: ConnectionPool) -> Self {
        info!(
            "database manager ready: host={}, port={}, database={}",
            config.host, config.port, config.database
        );
        Self {
            config: Arc::new(config),
            pool,
        }
    }

    /// Builds a MySQL driver for `config` and a pool over it.
    #[cfg(feature = "mysql")]
    pub async fn connect(config: DatabaseConfig, options: PoolOptions) -> Result<Self, DbError> {
        let driver = crate::udbc_mysql::MysqlDriver::new(&config)?;
        let pool = ConnectionPool::connect(Arc::new(driver), options).await?;
        Ok(Self::new(config, pool))
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub fn options(&self) -> &PoolOptions {
        self.pool.options()
    }

    /// Checks out a raw connection using the configured acquire timeout.
    pub async fn connection(&self) -> Result<PooledConnection, DbError> {
        self.pool.acquire(self.pool.options().acquire_timeout).await
    }

    /// Runs a read statement and returns every row.
    pub async fn execute_query<T>(&self, sql: &str, args: &T) -> Result<Vec<Row>, DbError>
    where
        T: Serialize + ?Sized,
    {
        let params = Params::from_serialize(args)?;
        let mut conn = self.connection().await?;
        let start = Instant::now();
        let result = conn.query(sql, &params).await;
        conn.release().await;

        match result {
            Ok(rows) => {
                debug!(
                    "query: sql={}, params={:?}, elapsed_ms={}, rows={}",
                    sql,
                    params,
                    start.elapsed().as_millis(),
                    rows.len()
                );
                Ok(rows)
            }
            Err(e) => {
                error!("query failed: sql={}, error={}", sql, e);
                Err(e.into_query())
            }
        }
    }

    /// Like [`execute_query`](Self::execute_query), deserializing each row into `R`.
    pub async fn query_as<R, T>(&self, sql: &str, args: &T) -> Result<Vec<R>, DbError>
    where
        R: serde::de::DeserializeOwned,
        T: Serialize + ?Sized,
    {
        self.execute_query(sql, args)
            .await?
            .iter()
            .map(from_row)
            .collect()
    }

    /// Runs an INSERT, UPDATE or DELETE and commits it. Any failure rolls back.
    pub async fn execute_update<T>(&self, sql: &str, args: &T) -> Result<u64, DbError>
    where
        T: Serialize + ?Sized,
    {
        let params = Params::from_serialize(args)?;
        let mut conn = self.connection().await?;
        let start = Instant::now();
        let result = match conn.execute(sql, &params).await {
            Ok(affected) => conn.commit().await.map(|_| affected),
            Err(e) => Err(e),
        };
        if result.is_err() {
            rollback_quietly(&mut conn).await;
        }
        conn.release().await;

        match result {
            Ok(affected) => {
                debug!(
                    "update: sql={}, params={:?}, elapsed_ms={}, affected={}",
                    sql,
                    params,
                    start.elapsed().as_millis(),
                    affected
                );
                Ok(affected)
            }
            Err(e) => {
                error!("update failed: sql={}, error={}", sql, e);
                Err(e.into_update())
            }
        }
    }

    /// Runs `sql` once per parameter set under a single commit. Either every
    /// set is applied or none is.
    pub async fn execute_batch<T: Serialize>(&self, sql: &str, args: &[T]) -> Result<u64, DbError> {
        let params = args
            .iter()
            .map(Params::from_serialize)
            .collect::<Result<Vec<_>, _>>()?;
        if params.is_empty() {
            return Ok(0);
        }

        let mut conn = self.connection().await?;
        let start = Instant::now();
        let result = match conn.execute_batch(sql, &params).await {
            Ok(affected) => conn.commit().await.map(|_| affected),
            Err(e) => Err(e),
        };
        if result.is_err() {
            rollback_quietly(&mut conn).await;
        }
        conn.release().await;

        match result {
            Ok(affected) => {
                debug!(
                    "batch: sql={}, sets={}, elapsed_ms={}, affected={}",
                    sql,
                    params.len(),
                    start.elapsed().as_millis(),
                    affected
                );
                Ok(affected)
            }
            Err(e) => {
                error!("batch failed: sql={}, sets={}, error={}", sql, params.len(), e);
                Err(e.into_update())
            }
        }
    }

    /// Starts a transaction on a freshly checked-out connection.
    pub async fn begin(&self) -> Result<Transaction, DbError> {
        let conn = self.connection().await?;
        Transaction::begin(conn).await
    }

    /// Runs `f` inside a transaction: commits if it returns `Ok`, rolls back
    /// and passes the error on otherwise.
    ///
    /// ```rust,ignore
    /// manager
    ///     .transaction(|tx| Box::pin(async move {
    ///         tx.execute("INSERT INTO roles (name) VALUES (?)", &("auditor",)).await?;
    ///         tx.execute("INSERT INTO role_permissions (role_id, permission_id) VALUES (LAST_INSERT_ID(), ?)", &(4,)).await
    ///     }))
    ///     .await?;
    /// ```
    pub async fn transaction<F, R>(&self, f: F) -> Result<R, DbError>
    where
        F: for<'t> FnOnce(&'t mut Transaction) -> BoxFuture<'t, Result<R, DbError>>,
    {
        let mut tx = self.begin().await?;
        match f(&mut tx).await {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(e) => {
                error!("transaction failed, rolling back: {}", e);
                if let Err(rollback_err) = tx.rollback().await {
                    warn!("rollback failed: {}", rollback_err);
                }
                Err(e)
            }
        }
    }

    pub async fn close(&self) {
        self.pool.close().await;
        info!("database manager closed");
    }

    pub fn stats(&self) -> ManagerStats {
        ManagerStats {
            pool: self.pool.stats(),
            host: self.config.host.clone(),
            port: self.config.port,
            database: self.config.database.clone(),
        }
    }
}

async fn rollback_quietly(conn: &mut PooledConnection) {
    if let Err(e) = conn.rollback().await {
        warn!("rollback failed: {}", e);
    }
}
