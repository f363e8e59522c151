//! Withdrawal Monitor
//!
//! A multi-tenant session manager and poller. It logs in to several
//! independent partner backends, escalates to one-time-passcode verification
//! when a backend asks for it, replaces rejected tokens with exactly one
//! fresh login, and folds each backend's withdrawal states into four
//! uniform buckets: new, review, transfer and bounce.
//!
//! # Architecture
//!
//! - [`config`]: service settings and the static tenant registry
//! - [`relay`]: outbound requests, directly or through a proxy endpoint
//! - [`session`]: token store, login with OTP escalation, count fetching
//! - [`monitor`]: periodic concurrent refresh and the aggregate snapshot
//! - [`navigation`]: dashboard window reuse
//! - [`server`]: HTTP API over all of the above
//!
//! # Examples
//!
//! ```rust
//! use withdrawal_monitor::types::{StateMapping, StatusCounts};
//! use serde_json::json;
//!
//! let items = vec![
//!     json!({ "state": { "stateName": "Withdraw-New" } }),
//!     json!({ "state": { "stateName": "Withdraw-New" } }),
//!     json!({ "state": { "stateName": "Third-Party-Refusal" } }),
//!     json!({ "state": { "stateName": "Unknown-State" } }),
//! ];
//! let counts = StateMapping::canonical().count(&items);
//! assert_eq!(counts, StatusCounts { new: 2, review: 0, transfer: 0, bounce: 1 });
//! ```
//!
//! ```rust
//! use withdrawal_monitor::session::{DurableStore, MemoryStore};
//!
//! tokio_test::block_on(async {
//!     let store = MemoryStore::new();
//!     store.store("pg688", "token").await.unwrap();
//!     assert_eq!(store.load("pg688").await.unwrap().as_deref(), Some("token"));
//! });
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod monitor;
pub mod navigation;
pub mod relay;
pub mod server;
pub mod session;
pub mod types;
pub mod utils;

pub use config::{Settings, SiteRegistry, TenantConfig};
pub use error::{Error, LoginFailure, Result};
pub use monitor::RefreshOrchestrator;
pub use session::{AuthSession, CountFetcher, TokenStore};
pub use types::{Bucket, Snapshot, StatusCounts};
