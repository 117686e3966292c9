use crate::error::DbError;
use crate::pool::PooledConnection;
use crate::udbc::connection::Connection;
use crate::udbc::deserializer::from_row;
use crate::udbc::params::Params;
use crate::udbc::value::Row;
use serde::Serialize;
use std::time::Instant;
use tracing::{debug, warn};

/// An open transaction holding one pooled connection until it is committed
/// or rolled back.
///
/// Dropping an unfinished transaction discards its work: the connection is
/// rolled back and returned to the pool on a spawned task.
pub struct Transaction {
    conn: Option<PooledConnection>,
}

impl Transaction {
    pub(crate) async fn begin(mut conn: PooledConnection) -> Result<Self, DbError> {
        if let Err(e) = conn.begin().await {
            conn.release().await;
            return Err(e);
        }
        Ok(Self { conn: Some(conn) })
    }

    fn conn(&mut self) -> Result<&mut PooledConnection, DbError> {
        self.conn
            .as_mut()
            .ok_or_else(|| DbError::Database("transaction already finished".to_string()))
    }

    /// Raw access to the underlying connection.
    pub fn connection(&mut self) -> Result<&mut (dyn Connection + 'static), DbError> {
        Ok(&mut **self.conn()?)
    }

    pub async fn query<T>(&mut self, sql: &str, args: &T) -> Result<Vec<Row>, DbError>
    where
        T: Serialize + ?Sized,
    {
        let params = Params::from_serialize(args)?;
        let start = Instant::now();
        let rows = self
            .conn()?
            .query(sql, &params)
            .await
            .map_err(DbError::into_query)?;
        debug!(
            "tx query: sql={}, elapsed_ms={}, rows={}",
            sql,
            start.elapsed().as_millis(),
            rows.len()
        );
        Ok(rows)
    }

    pub async fn query_as<R, T>(&mut self, sql: &str, args: &T) -> Result<Vec<R>, DbError>
    where
        R: serde::de::DeserializeOwned,
        T: Serialize + ?Sized,
    {
        self.query(sql, args).await?.iter().map(from_row).collect()
    }

    pub async fn execute<T>(&mut self, sql: &str, args: &T) -> Result<u64, DbError>
    where
        T: Serialize + ?Sized,
    {
        let params = Params::from_serialize(args)?;
        let start = Instant::now();
        let affected = self
            .conn()?
            .execute(sql, &params)
            .await
            .map_err(DbError::into_update)?;
        debug!(
            "tx execute: sql={}, elapsed_ms={}, affected={}",
            sql,
            start.elapsed().as_millis(),
            affected
        );
        Ok(affected)
    }

    pub async fn execute_batch<T: Serialize>(&mut self, sql: &str, args: &[T]) -> Result<u64, DbError> {
        let params = args
            .iter()
            .map(Params::from_serialize)
            .collect::<Result<Vec<_>, _>>()?;
        self.conn()?
            .execute_batch(sql, &params)
            .await
            .map_err(DbError::into_update)
    }

    pub async fn last_insert_id(&mut self) -> Result<u64, DbError> {
        self.conn()?.last_insert_id().await
    }

    pub async fn commit(mut self) -> Result<(), DbError> {
        let mut conn = match self.conn.take() {
            Some(conn) => conn,
            None => return Ok(()),
        };
        let result = conn.commit().await;
        conn.release().await;
        match &result {
            Ok(()) => debug!("transaction committed"),
            Err(e) => warn!("transaction commit failed: {}", e),
        }
        result
    }

    pub async fn rollback(mut self) -> Result<(), DbError> {
        let mut conn = match self.conn.take() {
            Some(conn) => conn,
            None => return Ok(()),
        };
        let result = conn.rollback().await;
        conn.release().await;
        debug!("transaction rolled back");
        result
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.conn.is_some() {
            // the pooled connection's own drop rolls back before reuse
            warn!("transaction dropped without commit or rollback, discarding its work");
        }
    }
}
