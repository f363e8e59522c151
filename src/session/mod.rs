//! Tenant sessions
//!
//! This module owns everything between a tenant's credentials and its
//! withdrawal counts: token caching across a memory and a durable tier,
//! login with OTP escalation, and count fetching with the invalid-token
//! retry.

pub mod auth;
pub mod counts;
pub mod otp;
pub mod store;

pub use auth::AuthSession;
pub use counts::CountFetcher;
pub use otp::{
    ChannelPrompter, DisabledPrompter, OtpOutcome, OtpPrompter, OtpRequest, TerminalPrompter,
};
pub use store::{DurableStore, FileStore, MemoryStore, TokenStore};
