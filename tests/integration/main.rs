//! Integration tests for Cirrus
//!
//! These tests drive the daemon end-to-end with an in-memory frontier, an
//! in-memory result store, and either a scripted renderer or a wiremock site.

mod common;
mod crawl_tests;
mod daemon_tests;
mod proxy_tests;
