//! HTML document wrapper
//!
//! A thin query layer over `scraper` for the three lookups the crawler
//! needs: attribute harvesting, trimmed text of the first match, and
//! iteration over nested matches.
//!
//! `scraper::Html` is not `Send`, so a [`Document`] must be built and
//! dropped between two await points.

use scraper::{ElementRef, Html, Selector};
use thiserror::Error;

/// Errors that can occur while parsing a rendered page
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Rendered page is empty")]
    EmptyDocument,

    #[error("Invalid selector '{selector}': {message}")]
    InvalidSelector { selector: String, message: String },
}

/// Compiles a CSS selector
pub fn compile_selector(selector: &str) -> Result<Selector, ParseError> {
    Selector::parse(selector).map_err(|e| ParseError::InvalidSelector {
        selector: selector.to_string(),
        message: format!("{:?}", e),
    })
}

/// A parsed HTML page
pub struct Document {
    html: Html,
}

impl Document {
    /// Parses an HTML body
    ///
    /// The HTML parser itself never fails; a blank body is the only input
    /// rejected.
    pub fn parse(body: &str) -> Result<Self, ParseError> {
        if body.trim().is_empty() {
            return Err(ParseError::EmptyDocument);
        }

        Ok(Self {
            html: Html::parse_document(body),
        })
    }

    /// Returns every element matching `selector`
    pub fn select<'a>(&'a self, selector: &'a Selector) -> impl Iterator<Item = ElementRef<'a>> + 'a {
        self.html.select(selector)
    }

    /// Collects the value of `attr` on every element matching `selector`
    pub fn attrs(&self, selector: &Selector, attr: &str) -> Vec<String> {
        self.html
            .select(selector)
            .filter_map(|element| element.value().attr(attr))
            .map(str::to_string)
            .collect()
    }

    /// Returns the trimmed text of the first element matching `selector`
    pub fn text(&self, selector: &Selector) -> Option<String> {
        self.html
            .select(selector)
            .next()
            .map(|element| element_text(&element))
    }

    /// Calls `f` with the trimmed text of every `item` inside every `parent`
    pub fn for_each<F>(&self, parent: &Selector, item: &Selector, mut f: F)
    where
        F: FnMut(&str, ElementRef<'_>),
    {
        for container in self.html.select(parent) {
            for element in container.select(item) {
                f(&element_text(&element), element);
            }
        }
    }

    /// Collects the trimmed text of every `item` inside every `parent`
    pub fn texts(&self, parent: &Selector, item: &Selector) -> Vec<String> {
        let mut texts = Vec::new();
        self.for_each(parent, item, |text, _| texts.push(text.to_string()));
        texts
    }
}

fn element_text(element: &ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}
