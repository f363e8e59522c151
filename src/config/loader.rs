//! Configuration loading utilities
//!
//! Provides helper functions for loading configuration from various sources
//! with proper error handling and validation.

use crate::{
    Result,
    config::{Settings, SiteRegistry},
};
use std::path::Path;
use tracing::{debug, info, warn};

/// Configuration loader with multiple source support
#[derive(Debug)]
pub struct ConfigLoader {
    /// Default settings
    defaults: Settings,
}

impl ConfigLoader {
    /// Create new configuration loader
    pub fn new() -> Self {
        Self {
            defaults: Settings::default(),
        }
    }

    /// Load configuration with precedence order:
    /// 1. Command line arguments (highest priority, applied by the caller)
    /// 2. Environment variables
    /// 3. Configuration file
    /// 4. Default values (lowest priority)
    pub fn load(&self, config_file: Option<&Path>) -> Result<Settings> {
        let Some(path) = config_file else {
            debug!("No configuration file given");
            return self.from_env_only();
        };

        let mut settings = self.defaults.clone();
        if path.exists() {
            info!("Loading configuration from file: {:?}", path);
            settings = Settings::from_file(path)?;
        } else {
            warn!("Configuration file not found: {:?}, using defaults", path);
        }

        // Override with environment variables
        debug!("Applying environment variable overrides");
        settings = settings.merge_with_env()?;

        // Validate final configuration
        settings.validate()?;

        info!("Configuration loaded successfully");
        Ok(settings)
    }

    /// Load configuration from environment only
    pub fn from_env_only(&self) -> Result<Settings> {
        let settings = Settings::from_env()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Build the tenant registry from inline tenants plus the sites file
    pub fn registry(&self, settings: &Settings) -> Result<SiteRegistry> {
        let mut tenants = settings.tenants.clone();
        if let Some(path) = &settings.sites_file {
            info!("Loading sites from file: {:?}", path);
            tenants.extend(SiteRegistry::read_file(path)?);
        }
        let registry = SiteRegistry::new(tenants)?;
        info!(
            "Registered {} tenant(s): {:?}",
            registry.len(),
            registry.ids()
        );
        Ok(registry)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
