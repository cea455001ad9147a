//! Per-page processing
//!
//! Every crawled page fans out: its anchors are classified and the crawlable
//! ones pushed to the frontier. Product pages are then checked against the
//! match rule and accepted products are written to the result store.

use crate::crawler::parser::{compile_selector, Document};
use crate::crawler::rule::{MatchRule, Verdict};
use crate::frontier::{Frontier, FrontierError};
use crate::store::{MatchedProduct, ProductStore};
use crate::url::{product_uid, Classified, Classifier, Kind};
use crate::CirrusError;
use chrono::Utc;
use scraper::Selector;
use std::collections::HashSet;
use std::sync::Arc;
use url::Url;

const ANCHOR_SELECTOR: &str = "body a[href]";

/// What a page yielded once parsed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageAnalysis {
    /// Canonical crawlable links, first occurrence order, no duplicates
    pub links: Vec<Classified>,
    /// Present only for product pages
    pub verdict: Option<Verdict>,
}

/// Result of processing one page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutcome {
    /// Links newly accepted into the pending set
    pub pushed: usize,
    /// Links skipped because they were already visited
    pub already_visited: usize,
    /// The product record, if the page matched and was stored
    pub matched: Option<MatchedProduct>,
}

/// Applies link harvesting and the match rule to rendered pages
pub struct PageProcessor {
    classifier: Classifier,
    rule: MatchRule,
    anchors: Selector,
    frontier: Arc<dyn Frontier>,
    store: Arc<dyn ProductStore>,
}

impl PageProcessor {
    pub fn new(
        classifier: Classifier,
        rule: MatchRule,
        frontier: Arc<dyn Frontier>,
        store: Arc<dyn ProductStore>,
    ) -> Result<Self, CirrusError> {
        Ok(Self {
            classifier,
            rule,
            anchors: compile_selector(ANCHOR_SELECTOR)?,
            frontier,
            store,
        })
    }

    /// Parses a page and extracts everything the crawl needs from it
    ///
    /// Synchronous: the parsed document never crosses an await point.
    pub fn analyze(&self, page: &Classified, body: &str) -> Result<PageAnalysis, CirrusError> {
        let doc = Document::parse(body)?;

        let base = Url::parse(&page.path).unwrap_or_else(|_| self.classifier.root().clone());
        let mut seen = HashSet::new();
        let links = doc
            .attrs(&self.anchors, "href")
            .iter()
            .map(|href| self.classifier.classify_href(href, &base))
            .filter(|link| link.kind.is_crawlable())
            .filter(|link| seen.insert(link.path.clone()))
            .collect();

        let verdict = match page.kind {
            Kind::Link => Some(self.rule.evaluate(&doc)),
            _ => None,
        };

        Ok(PageAnalysis { links, verdict })
    }

    /// Processes a rendered page
    ///
    /// # Returns
    ///
    /// * `Ok(ProcessOutcome)` - Links pushed; a failed result write is
    ///   logged, not returned
    /// * `Err(CirrusError)` - The page could not be parsed or the frontier
    ///   is unavailable; the caller pushes the page back
    pub async fn process(&self, page: &Classified, body: &str) -> Result<ProcessOutcome, CirrusError> {
        let analysis = self.analyze(page, body)?;
        let mut outcome = ProcessOutcome::default();

        for link in &analysis.links {
            match self.frontier.push(&link.path).await {
                Ok(()) => outcome.pushed += 1,
                Err(FrontierError::AlreadyVisited(_)) => outcome.already_visited += 1,
                Err(e) => return Err(e.into()),
            }
        }

        tracing::debug!(
            "Harvested {} links from {} ({} already visited)",
            outcome.pushed,
            page.path,
            outcome.already_visited
        );

        match analysis.verdict {
            Some(Ok(found)) => {
                let product = MatchedProduct {
                    uid: product_uid(&page.path),
                    url: page.path.clone(),
                    comment_count: found.comment_count,
                    express_tag: found.express_tag,
                    timestamp: Utc::now(),
                };

                match self.store.save(&product) {
                    Ok(id) => {
                        tracing::info!("Matched product {} stored as #{}", product.uid, id);
                        outcome.matched = Some(product);
                    }
                    Err(e) => {
                        tracing::error!("Failed to store matched product {}: {}", product.uid, e);
                    }
                }
            }
            Some(Err(rejection)) => {
                tracing::debug!("Product {} rejected: {}", page.path, rejection);
            }
            None => {}
        }

        Ok(outcome)
    }
}
