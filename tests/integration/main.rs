//! Integration tests for News Engine
//!
//! These tests use wiremock to serve news sites and feeds and run crawls and
//! the staged pipeline against them end to end.

mod common;
mod crawl_tests;
mod feed_tests;
mod pipeline_tests;
