//! Cirrus: a focused catalog crawler
//!
//! This crate walks a merchant catalog site from a root path, classifies the
//! links it discovers into category and product-detail pages, and keeps the
//! product pages that satisfy a configurable business rule.
//!
//! The crawl runs on three cooperating pieces:
//! - a deduplicating, crash-tolerant URL [`frontier`]
//! - a rotating [`proxy`] pool that replenishes itself in the background
//! - a polling [`crawler`] daemon that dispatches fetch tasks to a bounded pool

pub mod api;
pub mod config;
pub mod crawler;
pub mod frontier;
pub mod proxy;
pub mod store;
pub mod url;

use thiserror::Error;

/// Main error type for Cirrus operations
#[derive(Debug, Error)]
pub enum CirrusError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Frontier error: {0}")]
    Frontier(#[from] frontier::FrontierError),

    #[error("Proxy error: {0}")]
    Proxy(#[from] proxy::ProxyError),

    #[error("Result store error: {0}")]
    Store(#[from] store::StoreError),

    #[error("Render error: {0}")]
    Render(#[from] crawler::RenderError),

    #[error("Parse error: {0}")]
    Parse(#[from] crawler::ParseError),

    #[error("Invalid root URL: {0}")]
    InvalidRoot(String),

    #[error("Invalid daemon transition: {0}")]
    InvalidTransition(String),

    #[error("Task exceeded its {0:?} time limit")]
    TaskTimeout(std::time::Duration),

    #[error("Task canceled")]
    Canceled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid selector '{selector}': {message}")]
    InvalidSelector { selector: String, message: String },
}

/// Result type alias for Cirrus operations
pub type Result<T> = std::result::Result<T, CirrusError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{Daemon, DaemonState};
pub use crate::url::{Classified, Classifier, Kind};
