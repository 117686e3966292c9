pub mod connection;
pub mod deserializer;
pub mod driver;
pub mod params;
pub mod value;

pub const DEFAULT_DB_NAME: &str = "default";
