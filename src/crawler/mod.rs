//! Crawler module
//!
//! This module contains the crawl pipeline:
//! - page rendering over an optional proxy
//! - HTML parsing and link harvesting
//! - the product match rule
//! - the polling daemon that drives everything

mod daemon;
mod parser;
mod processor;
mod renderer;
mod rule;
mod state;

pub use daemon::{Daemon, DaemonOptions};
pub use parser::{compile_selector, Document, ParseError};
pub use processor::{PageAnalysis, PageProcessor, ProcessOutcome};
pub use renderer::{HttpRenderer, RenderError, Renderer};
pub use rule::{MatchRule, Rejection, RuleMatch, Verdict};
pub use state::{DaemonState, TaskView};
