//! Configuration module for Cirrus
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! The resulting [`Config`] is built once at startup and handed to each
//! component's constructor.
//!
//! # Example
//!
//! ```no_run
//! use cirrus::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("cirrus.toml")).unwrap();
//! println!("Crawler will run {} tasks at once", config.client.connections);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    ClientConfig, Config, FrontierBackend, FrontierConfig, JgConfig, LoggerConfig, ProxyConfig,
    RuleConfig, SiteConfig, StoreConfig, WebConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::validate;
