//! Result store module
//!
//! Matched products are written here by the page processor and read back
//! by the control API.

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteProductStore;
pub use traits::{
    MatchedProduct, ProductPage, ProductQuery, ProductStore, StoreError, StoreResult,
    StoredProduct,
};

use std::path::Path;

/// Opens (or creates) the result store database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteProductStore)` - Successfully opened store
/// * `Err(StoreError)` - Failed to open or initialize the database
pub fn open_store(path: &Path) -> StoreResult<SqliteProductStore> {
    SqliteProductStore::open(path)
}
