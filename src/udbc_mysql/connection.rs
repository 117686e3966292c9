use async_trait::async_trait;
use mysql_async::prelude::Queryable;
use mysql_async::{Conn, Row as MyRow};
use std::time::Instant;
use tracing::debug;

use crate::error::DbError;
use crate::udbc::connection::Connection;
use crate::udbc::params::Params;
use crate::udbc::value::Row;
use crate::udbc_mysql::value_codec::{from_mysql_value, to_mysql_params};

pub struct MysqlConnection {
    conn: Conn,
}

impl MysqlConnection {
    pub fn new(conn: Conn) -> Self {
        Self { conn }
    }

    pub fn id(&self) -> u32 {
        self.conn.id()
    }

    fn map_row(row: MyRow) -> Row {
        let columns = row.columns();
        let mut mapped = Row::with_capacity(columns.len());
        for (i, v) in row.unwrap().into_iter().enumerate() {
            let (table, name) = columns
                .get(i)
                .map(|c| (c.table_str().into_owned(), c.name_str().into_owned()))
                .unwrap_or_else(|| (String::new(), i.to_string()));
            let key = column_key(&mapped, &table, name);
            mapped.insert(key, from_mysql_value(v));
        }
        mapped
    }
}

/// A column name already present in the row is keyed as `table.column`
/// so joined tables sharing a column name keep both values.
fn column_key(row: &Row, table: &str, name: String) -> String {
    if row.contains_key(&name) && !table.is_empty() {
        format!("{}.{}", table, name)
    } else {
        name
    }
}

#[async_trait]
impl Connection for MysqlConnection {
    async fn query(&mut self, sql: &str, params: &Params) -> Result<Vec<Row>, DbError> {
        let rows: Vec<MyRow> = self.conn.exec(sql, to_mysql_params(params)).await?;
        Ok(rows.into_iter().map(Self::map_row).collect())
    }

    async fn execute(&mut self, sql: &str, params: &Params) -> Result<u64, DbError> {
        self.conn.exec_drop(sql, to_mysql_params(params)).await?;
        Ok(self.conn.affected_rows())
    }

    async fn execute_batch(&mut self, sql: &str, params: &[Params]) -> Result<u64, DbError> {
        let start = Instant::now();
        let stmt = self.conn.prep(sql).await?;
        let mut affected = 0;
        for p in params {
            self.conn.exec_drop(&stmt, to_mysql_params(p)).await?;
            affected += self.conn.affected_rows();
        }
        debug!(
            "batch: conn_id={}, sets={}, affected={}, elapsed_ms={}",
            self.conn.id(),
            params.len(),
            affected,
            start.elapsed().as_millis()
        );
        Ok(affected)
    }

    async fn last_insert_id(&mut self) -> Result<u64, DbError> {
        Ok(self.conn.last_insert_id().unwrap_or(0))
    }

    async fn ping(&mut self) -> Result<(), DbError> {
        self.conn.ping().await?;
        Ok(())
    }

    async fn begin(&mut self) -> Result<(), DbError> {
        self.conn.query_drop("START TRANSACTION").await?;
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), DbError> {
        self.conn.query_drop("COMMIT").await?;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), DbError> {
        self.conn.query_drop("ROLLBACK").await?;
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<(), DbError> {
        self.conn.disconnect().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::udbc::value::Value;

    #[test]
    fn test_duplicate_column_is_table_qualified() {
        let mut row = Row::new();
        let key = column_key(&row, "u", "id".to_string());
        assert_eq!(key, "id");
        row.insert(key, Value::I64(1));

        let key = column_key(&row, "r", "id".to_string());
        assert_eq!(key, "r.id");
        row.insert(key, Value::I64(7));

        assert_eq!(row.get("id").and_then(Value::as_i64), Some(1));
        assert_eq!(row.get("r.id").and_then(Value::as_i64), Some(7));
    }

    #[test]
    fn test_duplicate_expression_column_keeps_plain_name() {
        let mut row = Row::new();
        row.insert("n".to_string(), Value::I64(1));
        assert_eq!(column_key(&row, "", "n".to_string()), "n");
    }
}
