//! Response type definitions
//!
//! Defines the aggregate snapshot kept by the refresh orchestrator and the
//! JSON bodies served by the HTTP API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{StatusCounts, TenantId};

/// Latest known poll outcome for one tenant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollResult {
    pub tenant_id: TenantId,
    pub tenant_name: String,
    /// Counts from the last successful fetch (zero if none succeeded yet)
    pub counts: StatusCounts,
    /// When `counts` was fetched
    pub timestamp: DateTime<Utc>,
    /// Whether the most recent attempt succeeded
    pub success: bool,
    /// Error text of the most recent failed attempt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregate view over all tenants
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub tenants: BTreeMap<TenantId, PollResult>,
    /// Set when a whole batch has settled
    pub last_updated: Option<DateTime<Utc>>,
    /// Number of settled batches
    pub generation: u64,
}

impl Snapshot {
    /// Replace a tenant's entry with freshly fetched counts
    pub fn record_success(
        &mut self,
        tenant_id: TenantId,
        tenant_name: &str,
        counts: StatusCounts,
        at: DateTime<Utc>,
    ) {
        self.tenants.insert(
            tenant_id,
            PollResult {
                tenant_id,
                tenant_name: tenant_name.to_string(),
                counts,
                timestamp: at,
                success: true,
                error: None,
            },
        );
    }

    /// Mark a tenant's latest attempt as failed.
    ///
    /// Counts and timestamp of a previous success are kept as they were.
    pub fn record_failure(
        &mut self,
        tenant_id: TenantId,
        tenant_name: &str,
        error: impl Into<String>,
        at: DateTime<Utc>,
    ) {
        let error = error.into();
        match self.tenants.get_mut(&tenant_id) {
            Some(entry) => {
                entry.success = false;
                entry.error = Some(error);
            }
            None => {
                self.tenants.insert(
                    tenant_id,
                    PollResult {
                        tenant_id,
                        tenant_name: tenant_name.to_string(),
                        counts: StatusCounts::default(),
                        timestamp: at,
                        success: false,
                        error: Some(error),
                    },
                );
            }
        }
    }

    /// Close a batch
    pub fn mark_settled(&mut self, at: DateTime<Utc>) {
        self.last_updated = Some(at);
        self.generation += 1;
    }

    /// Bucket-wise totals across all tenants
    pub fn totals(&self) -> StatusCounts {
        self.tenants
            .values()
            .fold(StatusCounts::default(), |acc, r| acc.merged(r.counts))
    }
}

/// Snapshot plus derived totals, as served by `GET /snapshot`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotResponse {
    #[serde(flatten)]
    pub snapshot: Snapshot,
    pub totals: StatusCounts,
}

impl From<Snapshot> for SnapshotResponse {
    fn from(snapshot: Snapshot) -> Self {
        let totals = snapshot.totals();
        Self { snapshot, totals }
    }
}

/// Outcome of one refresh batch
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub succeeded: Vec<TenantId>,
    pub failed: BTreeMap<TenantId, String>,
    pub completed_at: DateTime<Utc>,
    pub generation: u64,
}

/// OTP prompt waiting for a code, as listed by `GET /otp`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingOtp {
    pub tenant_id: TenantId,
    pub site_name: String,
    pub referer: String,
    pub operator_name: String,
    pub attempt: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    pub requested_at: DateTime<Utc>,
}

/// Result of routing to a tenant's dashboard
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteResponse {
    pub tenant_id: TenantId,
    pub url: String,
    /// True when an existing window was reused
    pub reused: bool,
}

/// Ping response for health checks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingResponse {
    /// Server uptime in seconds
    pub server_uptime: u64,

    /// Server version
    pub version: String,
}

impl PingResponse {
    /// Create a new ping response
    pub fn new(server_uptime: u64, version: impl Into<String>) -> Self {
        Self {
            server_uptime,
            version: version.into(),
        }
    }
}

/// Error response for API errors
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error message
    pub error: String,
}

impl ErrorResponse {
    /// Create a new error response
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn counts(new: u32) -> StatusCounts {
        StatusCounts {
            new,
            ..Default::default()
        }
    }

    #[test]
    fn test_failure_keeps_previous_counts() {
        let first = Utc::now() - Duration::minutes(1);
        let mut snapshot = Snapshot::default();
        snapshot.record_success(2, "NEW88", counts(4), first);

        snapshot.record_failure(2, "NEW88", "Token invalid for NEW88", Utc::now());

        let entry = &snapshot.tenants[&2];
        assert_eq!(entry.counts, counts(4));
        assert_eq!(entry.timestamp, first);
        assert!(!entry.success);
        assert_eq!(entry.error.as_deref(), Some("Token invalid for NEW88"));
    }

    #[test]
    fn test_failure_without_history() {
        let mut snapshot = Snapshot::default();
        snapshot.record_failure(5, "TH39", "boom", Utc::now());

        let entry = &snapshot.tenants[&5];
        assert_eq!(entry.counts, StatusCounts::default());
        assert!(!entry.success);
    }

    #[test]
    fn test_success_clears_error() {
        let mut snapshot = Snapshot::default();
        snapshot.record_failure(1, "PG688", "boom", Utc::now());
        snapshot.record_success(1, "PG688", counts(1), Utc::now());

        let entry = &snapshot.tenants[&1];
        assert!(entry.success);
        assert!(entry.error.is_none());
    }

    #[test]
    fn test_totals_and_settle() {
        let mut snapshot = Snapshot::default();
        snapshot.record_success(1, "PG688", counts(2), Utc::now());
        snapshot.record_success(7, "JL69", counts(3), Utc::now());
        assert_eq!(snapshot.totals().new, 5);

        assert!(snapshot.last_updated.is_none());
        snapshot.mark_settled(Utc::now());
        assert!(snapshot.last_updated.is_some());
        assert_eq!(snapshot.generation, 1);
    }

    #[test]
    fn test_snapshot_response_serialization() {
        let mut snapshot = Snapshot::default();
        snapshot.record_success(1, "PG688", counts(2), Utc::now());

        let json = serde_json::to_value(SnapshotResponse::from(snapshot)).unwrap();
        assert_eq!(json["totals"]["new"], 2);
        assert_eq!(json["tenants"]["1"]["tenantName"], "PG688");
        assert_eq!(json["generation"], 0);
    }

    #[test]
    fn test_ping_response() {
        let response = PingResponse::new(3600, "1.0.0");
        assert_eq!(response.server_uptime, 3600);
        assert_eq!(response.version, "1.0.0");
    }

    #[test]
    fn test_error_response() {
        let response = ErrorResponse::new("Test error");
        assert_eq!(response.error, "Test error");
    }
}
