//! SQLite result store
//!
//! This module provides a SQLite-based implementation of the ProductStore
//! trait.

use crate::store::schema::initialize_schema;
use crate::store::traits::{
    MatchedProduct, ProductPage, ProductQuery, ProductStore, StoreError, StoreResult,
    StoredProduct,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const WINDOW_FILTER: &str = "(?1 IS NULL OR timestamp >= ?1) AND (?2 IS NULL OR timestamp <= ?2)";

/// SQLite result store
///
/// The connection is guarded by a mutex so one store can be shared by every
/// crawl task and the control API.
pub struct SqliteProductStore {
    conn: Mutex<Connection>,
}

impl SqliteProductStore {
    /// Opens or creates the database at `path`
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteProductStore)` - Successfully opened/created database
    /// * `Err(StoreError)` - Failed to open database
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory database
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }
}

fn row_to_product(row: &Row<'_>) -> rusqlite::Result<StoredProduct> {
    let millis: i64 = row.get(5)?;
    let timestamp = DateTime::<Utc>::from_timestamp_millis(millis).unwrap_or_default();
    let comments: i64 = row.get(3)?;

    Ok(StoredProduct {
        id: row.get(0)?,
        product: MatchedProduct {
            uid: row.get(1)?,
            url: row.get(2)?,
            comment_count: comments.max(0) as u64,
            express_tag: row.get(4)?,
            timestamp,
        },
    })
}

impl ProductStore for SqliteProductStore {
    fn save(&self, product: &MatchedProduct) -> StoreResult<i64> {
        let comments = i64::try_from(product.comment_count).map_err(|_| {
            StoreError::Database(format!(
                "comment count {} out of range",
                product.comment_count
            ))
        })?;

        let conn = self.lock()?;
        let id = conn.query_row(
            "INSERT INTO goods (uid, url, comments, express, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(url) DO UPDATE SET
                uid = excluded.uid,
                comments = excluded.comments,
                express = excluded.express,
                timestamp = excluded.timestamp
             RETURNING id",
            params![
                product.uid,
                product.url,
                comments,
                product.express_tag,
                product.timestamp.timestamp_millis()
            ],
            |row| row.get(0),
        )?;

        Ok(id)
    }

    fn query(&self, query: &ProductQuery) -> StoreResult<ProductPage> {
        query.validate()?;

        let start = query.start.map(|t| t.timestamp_millis());
        let end = query.end.map(|t| t.timestamp_millis());
        let limit = i64::from(query.size);
        let offset = i64::try_from(query.offset())
            .map_err(|_| StoreError::InvalidQuery("page out of range".to_string()))?;

        let conn = self.lock()?;

        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM goods WHERE {}", WINDOW_FILTER),
            params![start, end],
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(&format!(
            "SELECT id, uid, url, comments, express, timestamp FROM goods
             WHERE {}
             ORDER BY timestamp DESC, id DESC
             LIMIT ?3 OFFSET ?4",
            WINDOW_FILTER
        ))?;

        let items = stmt
            .query_map(params![start, end, limit, offset], row_to_product)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ProductPage {
            total: total.max(0) as u64,
            page: query.page,
            size: query.size,
            items,
        })
    }

    fn count(&self) -> StoreResult<u64> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM goods", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }
}
