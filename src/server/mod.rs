//! HTTP API
//!
//! Read access to the aggregate snapshot plus manual controls: refresh,
//! token invalidation, dashboard routing and answering OTP prompts.

pub mod app;
pub mod handlers;

pub use app::{AppState, create_app};
