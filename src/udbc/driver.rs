use crate::error::DbError;
use crate::udbc::connection::Connection;
use async_trait::async_trait;

/// Opens new sessions against one database target.
#[async_trait]
pub trait Driver: Send + Sync {
    fn name(&self) -> &str;

    fn r#type(&self) -> &str;

    /// Opens a brand-new session. Failures are reported as
    /// [`DbError::ConnectionOpen`].
    async fn connect(&self) -> Result<Box<dyn Connection>, DbError>;
}
