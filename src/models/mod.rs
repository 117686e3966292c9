pub mod db_config;

pub use db_config::{DatabaseConfig, PoolOptions};
