use crate::error::DbError;
use crate::udbc::params::Params;
use crate::udbc::value::Row;
use async_trait::async_trait;

/// One live database session.
///
/// A connection is owned by exactly one holder at a time, so every method
/// takes `&mut self` and implementations need no internal locking.
#[async_trait]
pub trait Connection: Send {
    async fn query(&mut self, sql: &str, params: &Params) -> Result<Vec<Row>, DbError>;

    async fn execute(&mut self, sql: &str, params: &Params) -> Result<u64, DbError>;

    /// Runs `sql` once per parameter set and returns the summed affected rows.
    async fn execute_batch(&mut self, sql: &str, params: &[Params]) -> Result<u64, DbError> {
        let mut affected = 0;
        for p in params {
            affected += self.execute(sql, p).await?;
        }
        Ok(affected)
    }

    async fn last_insert_id(&mut self) -> Result<u64, DbError>;

    /// Round-trips to the server without reconnecting.
    async fn ping(&mut self) -> Result<(), DbError>;

    // ---------- transaction ----------
    async fn begin(&mut self) -> Result<(), DbError>;
    async fn commit(&mut self) -> Result<(), DbError>;
    async fn rollback(&mut self) -> Result<(), DbError>;

    async fn close(self: Box<Self>) -> Result<(), DbError>;
}
