//! URL handling module for News Engine
//!
//! This module provides URL normalization (used to deduplicate articles and
//! derive stable article ids) and host helpers used by pagination checks.

mod domain;
mod normalize;

// Re-export main functions
pub use domain::{extract_domain, same_host};
pub use normalize::normalize_url;
