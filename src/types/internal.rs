//! Internal data structures
//!
//! Defines the session token held by the token store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Numeric tenant identifier, as used in the sites file
pub type TenantId = u32;

/// How a session token was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenSource {
    /// Operator name + password login
    Password,
    /// Login completed through OTP verification
    Otp,
    /// Re-read from the durable tier, which keeps no metadata
    Restored,
}

/// Session token for one tenant
///
/// Tokens are replaced as a whole; nothing edits one in place.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionToken {
    /// Owning tenant
    pub tenant_id: TenantId,
    /// Opaque token value sent to the backend
    pub value: String,
    /// Where the token came from
    pub source: TokenSource,
    /// When the token was obtained (or restored)
    pub issued_at: DateTime<Utc>,
}

impl SessionToken {
    /// Create a token issued now
    pub fn new(tenant_id: TenantId, value: impl Into<String>, source: TokenSource) -> Self {
        Self {
            tenant_id,
            value: value.into(),
            source,
            issued_at: Utc::now(),
        }
    }

    /// Age of the token
    pub fn age(&self) -> chrono::Duration {
        Utc::now() - self.issued_at
    }
}

impl std::fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionToken")
            .field("tenant_id", &self.tenant_id)
            .field("value", &"<redacted>")
            .field("source", &self.source)
            .field("issued_at", &self.issued_at)
            .finish()
    }
}
