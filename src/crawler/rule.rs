//! Product match rule
//!
//! A product page is kept when it has reviews, ships for free, and is sold
//! without a brand. Selectors and marker strings come from `[rule]` in the
//! configuration so the rule can follow markup changes on the site.

use crate::config::RuleConfig;
use crate::crawler::parser::{compile_selector, Document, ParseError};
use crate::ConfigError;
use scraper::Selector;
use std::fmt;

/// Facts extracted from an accepted page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleMatch {
    pub comment_count: u64,
    /// The shipping fragment carrying the free-shipping marker
    pub express_tag: String,
}

/// Why a product page was not kept
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// The comment count is missing, zero or not a number
    NoComments(Option<String>),
    /// The shipping block did not have exactly two fragments
    ShippingFragments(usize),
    /// The second shipping fragment lacks the free-shipping marker
    NotFreeShipping(String),
    /// The brand cell is missing or names a brand
    Branded(Option<String>),
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoComments(Some(text)) => write!(f, "no comments ('{}')", text),
            Self::NoComments(None) => write!(f, "no comment field"),
            Self::ShippingFragments(n) => write!(f, "{} shipping fragments, expected 2", n),
            Self::NotFreeShipping(fragment) => write!(f, "not free shipping ('{}')", fragment),
            Self::Branded(Some(brand)) => write!(f, "branded ('{}')", brand),
            Self::Branded(None) => write!(f, "no brand cell"),
        }
    }
}

/// Outcome of evaluating the rule on one page
pub type Verdict = Result<RuleMatch, Rejection>;

/// The match rule with its selectors compiled
#[derive(Debug, Clone)]
pub struct MatchRule {
    comment: Selector,
    shipping_parent: Selector,
    shipping_item: Selector,
    free_shipping_marker: String,
    info_table: Selector,
    info_cell: Selector,
    brand_label: String,
    no_brand_marker: String,
}

impl MatchRule {
    /// Compiles the configured selectors
    ///
    /// # Returns
    ///
    /// * `Ok(MatchRule)` - Every selector compiled
    /// * `Err(ConfigError::InvalidSelector)` - A selector is not valid CSS
    pub fn compile(config: &RuleConfig) -> Result<Self, ConfigError> {
        let compile = |selector: &str| {
            compile_selector(selector).map_err(|e| match e {
                ParseError::InvalidSelector { selector, message } => {
                    ConfigError::InvalidSelector { selector, message }
                }
                other => ConfigError::Validation(other.to_string()),
            })
        };

        Ok(Self {
            comment: compile(&config.comment_selector)?,
            shipping_parent: compile(&config.shipping_parent)?,
            shipping_item: compile(&config.shipping_item)?,
            free_shipping_marker: config.free_shipping_marker.clone(),
            info_table: compile(&config.info_table)?,
            info_cell: compile(&config.info_cell)?,
            brand_label: config.brand_label.clone(),
            no_brand_marker: config.no_brand_marker.clone(),
        })
    }

    /// Applies the three checks in order, stopping at the first rejection
    pub fn evaluate(&self, doc: &Document) -> Verdict {
        let comment_count = self.comment_count(doc)?;
        let express_tag = self.free_shipping(doc)?;
        self.unbranded(doc)?;

        Ok(RuleMatch {
            comment_count,
            express_tag,
        })
    }

    /// The first whitespace-separated token must be a positive integer,
    /// e.g. `"12 avis"`
    fn comment_count(&self, doc: &Document) -> Result<u64, Rejection> {
        let text = doc.text(&self.comment).ok_or(Rejection::NoComments(None))?;

        text.split_whitespace()
            .next()
            .and_then(|token| token.parse::<u64>().ok())
            .filter(|count| *count > 0)
            .ok_or(Rejection::NoComments(Some(text)))
    }

    fn free_shipping(&self, doc: &Document) -> Result<String, Rejection> {
        let fragments = doc.texts(&self.shipping_parent, &self.shipping_item);
        if fragments.len() != 2 {
            return Err(Rejection::ShippingFragments(fragments.len()));
        }

        let second = &fragments[1];
        if second.contains(&self.free_shipping_marker) {
            Ok(second.clone())
        } else {
            Err(Rejection::NotFreeShipping(second.clone()))
        }
    }

    /// The info table flattens to label, value, label, value... cells
    fn unbranded(&self, doc: &Document) -> Result<(), Rejection> {
        let cells = doc.texts(&self.info_table, &self.info_cell);
        let brand = cells
            .iter()
            .position(|cell| *cell == self.brand_label)
            .and_then(|index| cells.get(index + 1));

        match brand {
            Some(value) if *value == self.no_brand_marker => Ok(()),
            other => Err(Rejection::Branded(other.cloned())),
        }
    }
}
