//! Proxy module
//!
//! This module keeps a working set of short-lived outbound proxy endpoints
//! topped up from a commercial provider:
//! - [`ProxyProvider`] abstracts the provider API
//! - [`JgProvider`] is the HTTP client for the JG provider
//! - [`acquire_endpoints`] spends the free quota before the paid one
//! - [`ProxyPool`] hands out endpoints and refills in the background

mod accounting;
mod jg;
mod pool;
mod traits;

pub use accounting::acquire_endpoints;
pub use jg::JgProvider;
pub use pool::ProxyPool;
pub use traits::{ProxyError, ProxyProvider, ProxyResult, QuotaSource};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::fmt;

/// Proxy protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Http,
    Https,
    Socks5,
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Http => "http",
            Self::Https => "https",
            Self::Socks5 => "socks5",
        };
        write!(f, "{}", s)
    }
}

/// A temporary outbound proxy
///
/// Two endpoints are the same proxy when `(ip, port)` match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Endpoint {
    pub scheme: Scheme,
    pub ip: String,
    pub port: u16,
    pub expire_time: DateTime<Utc>,
    pub country: String,
    pub city: String,
    pub isp: String,
    pub usage_count: u64,
}

impl Endpoint {
    /// Creates an endpoint with empty location metadata
    pub fn new(scheme: Scheme, ip: impl Into<String>, port: u16, expire_time: DateTime<Utc>) -> Self {
        Self {
            scheme,
            ip: ip.into(),
            port,
            expire_time,
            country: String::new(),
            city: String::new(),
            isp: String::new(),
            usage_count: 0,
        }
    }

    /// Returns the proxy URL, e.g. `http://1.2.3.4:8080`
    pub fn addr(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.ip, self.port)
    }

    pub fn same_proxy(&self, other: &Endpoint) -> bool {
        self.ip == other.ip && self.port == other.port
    }

    /// Time left before the provider stops honouring this endpoint
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        self.expire_time - now
    }

    /// Returns true if more than `margin` of lifetime is left
    pub fn is_fresh(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        self.remaining(now) > margin
    }
}

/// Currency of a provider balance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Coin {
    #[serde(rename = "RMB")]
    Rmb,
    /// Free or unmetered balance
    #[serde(rename = "X")]
    Unlimited,
}

/// Provider account balance snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Balance {
    pub amount: f64,
    pub coin: Coin,
}

impl Balance {
    pub fn unlimited() -> Self {
        Self {
            amount: f64::MAX,
            coin: Coin::Unlimited,
        }
    }
}
