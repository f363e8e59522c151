//! Error handling for the monitor
//!
//! This module defines error types and handling patterns used throughout the application.

pub mod types;

pub use types::{Error, LoginFailure, Result};
