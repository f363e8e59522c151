//! Error type definitions
//!
//! Defines the main error types used throughout the monitor.

use thiserror::Error;

use crate::types::TenantId;

/// Why a login ended without a token.
///
/// Every variant is terminal: the login is not retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoginFailure {
    /// The login (or OTP) response carried no token field
    #[error("token not found in login response")]
    MissingToken,

    /// The OTP collaborator canceled the prompt
    #[error("OTP canceled")]
    OtpCanceled,

    /// Nobody answered the OTP prompt in time
    #[error("OTP prompt timed out after {seconds}s")]
    OtpTimedOut { seconds: u64 },

    /// Every submitted OTP code was refused
    #[error("OTP rejected after {attempts} attempt(s)")]
    OtpRejected { attempts: u32 },
}

/// Main error type for the monitor
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Lookup of a tenant id that is not registered
    #[error("Site config not found for ID {id}")]
    UnknownTenant { id: TenantId },

    /// Login finished without a usable token
    #[error("Login failed for {tenant}: {reason}")]
    Login { tenant: String, reason: LoginFailure },

    /// The backend rejected the session token
    #[error("Token invalid for {tenant}")]
    InvalidToken { tenant: String },

    /// The upstream answered with HTML where JSON was expected
    #[error("Upstream returned HTML instead of JSON from {url}")]
    UpstreamProtocol { url: String, snippet: String },

    /// Non-success backend response that is not an auth failure
    #[error("Upstream error {status}: {message}")]
    Upstream { status: u16, message: String },

    /// Network/HTTP client errors
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing errors
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Durable token storage errors
    #[error("Storage error: {operation}")]
    Storage { operation: String },

    /// The relay could not reach the upstream at all
    #[error("Transport error via relay: {0}")]
    RelayTransport(String),

    /// Generic errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a login error for the named tenant
    pub fn login(tenant: impl Into<String>, reason: LoginFailure) -> Self {
        Self::Login {
            tenant: tenant.into(),
            reason,
        }
    }

    /// Create an invalid token error
    pub fn invalid_token(tenant: impl Into<String>) -> Self {
        Self::InvalidToken {
            tenant: tenant.into(),
        }
    }

    /// Create an upstream protocol error, keeping a short prefix of the body
    pub fn upstream_protocol(url: impl Into<String>, body: &str) -> Self {
        Self::UpstreamProtocol {
            url: url.into(),
            snippet: body.chars().take(300).collect(),
        }
    }

    /// Create an upstream status error
    pub fn upstream(status: u16, message: impl Into<String>) -> Self {
        Self::Upstream {
            status,
            message: message.into(),
        }
    }

    /// Create a storage error
    pub fn storage(operation: impl Into<String>) -> Self {
        Self::Storage {
            operation: operation.into(),
        }
    }

    /// Create a transport error reported by a relay
    pub fn relay_transport(msg: impl Into<String>) -> Self {
        Self::RelayTransport(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this is a login failure that must not be retried
    pub fn is_terminal_login(&self) -> bool {
        matches!(self, Self::Login { .. })
    }
}
