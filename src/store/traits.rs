//! Result store traits and error types
//!
//! This module defines the trait interface for matched-product storage
//! backends and associated error types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during result store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Store lock poisoned")]
    Poisoned,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// A product page accepted by the match rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchedProduct {
    /// Last path segment of the product URL without `.html`
    pub uid: String,
    pub url: String,
    pub comment_count: u64,
    /// Shipping fragment that carried the free-shipping marker
    pub express_tag: String,
    pub timestamp: DateTime<Utc>,
}

/// A matched product as read back from the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredProduct {
    pub id: i64,
    #[serde(flatten)]
    pub product: MatchedProduct,
}

/// Filter and pagination for [`ProductStore::query`]
///
/// Pages are 1-based. Results are ordered newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductQuery {
    pub page: u32,
    pub size: u32,
    /// Inclusive lower bound on the match timestamp
    pub start: Option<DateTime<Utc>>,
    /// Inclusive upper bound on the match timestamp
    pub end: Option<DateTime<Utc>>,
}

impl ProductQuery {
    pub const MAX_PAGE_SIZE: u32 = 100;

    /// Checks page bounds and the time window
    pub fn validate(&self) -> StoreResult<()> {
        if self.page == 0 {
            return Err(StoreError::InvalidQuery("page starts at 1".to_string()));
        }

        if self.size == 0 || self.size > Self::MAX_PAGE_SIZE {
            return Err(StoreError::InvalidQuery(format!(
                "size must be between 1 and {}, got {}",
                Self::MAX_PAGE_SIZE,
                self.size
            )));
        }

        if let (Some(start), Some(end)) = (self.start, self.end) {
            if start > end {
                return Err(StoreError::InvalidQuery(
                    "start must not be after end".to_string(),
                ));
            }
        }

        Ok(())
    }

    pub(crate) fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.size)
    }
}

impl Default for ProductQuery {
    fn default() -> Self {
        Self {
            page: 1,
            size: 20,
            start: None,
            end: None,
        }
    }
}

/// One page of query results
#[derive(Debug, Clone, Serialize)]
pub struct ProductPage {
    /// Number of products matching the filter across all pages
    pub total: u64,
    pub page: u32,
    pub size: u32,
    pub items: Vec<StoredProduct>,
}

/// Trait for result store implementations
///
/// Implementations must be safe to share between crawl tasks.
pub trait ProductStore: Send + Sync {
    /// Records a matched product
    ///
    /// Saving the same URL again refreshes the stored record.
    ///
    /// # Returns
    ///
    /// The row ID of the stored product
    fn save(&self, product: &MatchedProduct) -> StoreResult<i64>;

    /// Lists matched products, newest first
    fn query(&self, query: &ProductQuery) -> StoreResult<ProductPage>;

    /// Returns the total number of matched products
    fn count(&self) -> StoreResult<u64>;
}
