pub mod error;
pub mod manager;
pub mod models;
pub mod pool;
pub mod transaction;
pub mod udbc;
#[cfg(feature = "mysql")]
pub mod udbc_mysql;

pub use error::{DbError, DbResult};
pub use manager::{DatabaseManager, ManagerStats};
pub use models::{DatabaseConfig, PoolOptions};
pub use pool::{ConnectionPool, PoolStats, PooledConnection};
pub use transaction::Transaction;
pub use udbc::params::Params;
pub use udbc::value::{Row, Value};
