//! Configuration management for the monitor
//!
//! This module handles loading service settings and the static tenant
//! registry.

pub mod loader;
pub mod registry;
pub mod settings;

pub use loader::ConfigLoader;
pub use registry::{AuthScheme, SiteRegistry, TenantConfig};
pub use settings::{OtpMode, OtpSettings, RelayMode, Settings};
