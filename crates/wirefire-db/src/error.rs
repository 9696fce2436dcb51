//! error type for wirefire-db.

use thiserror::Error;

/// errors from the store layer.
#[derive(Debug, Error)]
pub enum Error {
    /// failed to open the database.
    #[error("database connection failed: {0}")]
    Connection(String),

    /// a migration failed to apply.
    #[error("migration failed: {0}")]
    Migration(String),

    /// a query failed.
    #[error(transparent)]
    Db(#[from] sea_orm::DbErr),

    /// a stored value failed to decode.
    #[error("invalid stored data: {0}")]
    InvalidData(String),

    /// the address pool is exhausted or misconfigured.
    #[error("ip allocation failed: {0}")]
    Ipam(String),
}

impl Error {
    /// whether this error is an interrupted query.
    ///
    /// the map session suppresses these and treats the tick as a graceful
    /// cancellation instead of a session failure.
    pub fn is_interrupt(&self) -> bool {
        match self {
            Error::Db(e) => e.to_string().to_lowercase().contains("interrupt"),
            _ => false,
        }
    }
}
