//! Seam between the normalizer and remote data access.

use crate::error::Result;
use crate::table::Table;

/// Client able to fetch a whole collection from a remote geo-database.
///
/// Implementations own their connection state and are handed to the
/// feature handler at construction. Retries, timeouts and
/// authentication belong to the implementation.
pub trait DataSourceClient: Send + Sync {
    fn get_collection(&self, collection: &str, database: &str) -> Result<Table>;
}
