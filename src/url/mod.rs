//! URL handling module for Cirrus
//!
//! This module canonicalizes raw links and classifies them as category
//! listings or product detail pages of the target site.

mod classify;

pub use classify::{product_uid, Classifier};

use serde::Serialize;
use std::fmt;

/// Page classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    /// Off-site, unresolvable, or without a usable trailing segment
    Unknown,
    /// Category or listing page - crawled only to fan out
    Group,
    /// Product detail page - harvested and checked against the match rule
    Link,
}

impl Kind {
    /// Returns true if pages of this kind belong in the frontier
    pub fn is_crawlable(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unknown => "unknown",
            Self::Group => "group",
            Self::Link => "link",
        };
        write!(f, "{}", s)
    }
}

/// A canonical path and its classification
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Classified {
    pub path: String,
    pub kind: Kind,
}

impl Classified {
    pub fn unknown(raw: &str) -> Self {
        Self {
            path: raw.to_string(),
            kind: Kind::Unknown,
        }
    }
}
