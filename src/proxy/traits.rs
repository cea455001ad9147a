//! Proxy provider trait and error types

use crate::proxy::{Balance, Endpoint};
use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur while obtaining proxy endpoints
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProxyError {
    #[error("No proxy endpoint available")]
    NoEndpointAvailable,

    #[error("Proxy provider error: {0}")]
    Provider(String),

    #[error("Proxy provider balance insufficient: {0}")]
    InsufficientBalance(String),

    #[error("Proxy package expired: {0}")]
    PackageExpired(String),

    #[error("Proxy provider rate limited: {0}")]
    RateLimited(String),

    #[error("Proxy provider unreachable: {0}")]
    Unreachable(String),

    #[error("Proxy request canceled")]
    Canceled,
}

impl ProxyError {
    /// Returns true if the operation may succeed when tried again later
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NoEndpointAvailable | Self::Provider(_) | Self::RateLimited(_) | Self::Unreachable(_)
        )
    }

    /// Returns true if the account needs operator attention before any
    /// further endpoint can be bought
    pub fn is_account_exhausted(&self) -> bool {
        matches!(self, Self::InsufficientBalance(_) | Self::PackageExpired(_))
    }
}

/// Result type for proxy operations
pub type ProxyResult<T> = Result<T, ProxyError>;

/// Which quota a batch of endpoints is charged against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaSource {
    /// The provider's daily free package
    Free,
    /// The paid account balance
    Paid,
}

/// Trait for proxy provider clients
#[async_trait]
pub trait ProxyProvider: Send + Sync {
    /// Provider name for logging
    fn name(&self) -> &str;

    /// Verifies credentials and prepares the account for use
    ///
    /// Fails with [`ProxyError::Provider`] on empty or rejected credentials.
    async fn init(&self) -> ProxyResult<()>;

    /// Returns how many endpoints the free package still covers
    async fn free_quota(&self) -> ProxyResult<usize>;

    /// Requests `count` new endpoints charged to `source`
    async fn fetch_endpoints(&self, count: usize, source: QuotaSource) -> ProxyResult<Vec<Endpoint>>;

    /// Returns the paid account balance
    async fn balance(&self) -> ProxyResult<Balance>;
}
