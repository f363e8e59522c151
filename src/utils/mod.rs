//! Utility functions and helpers
//!
//! This module contains utility functions used throughout the application.

pub mod cache;
pub mod version;

pub use cache::{default_token_file, get_cache_path};
pub use version::get_version;
