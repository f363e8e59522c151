//! Status counts and the state vocabulary they are folded from
//!
//! Every tenant reports withdrawals with its own `state.stateName` strings.
//! A [`StateMapping`] folds those into one of four canonical [`Bucket`]s and
//! [`StatusCounts`] holds the per-bucket totals.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Canonical status bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bucket {
    New,
    Review,
    Transfer,
    Bounce,
}

/// Per-bucket withdrawal counters
///
/// All four keys are always serialized, zero or not.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub new: u32,
    pub review: u32,
    pub transfer: u32,
    pub bounce: u32,
}

impl StatusCounts {
    /// Count one item in the given bucket
    pub fn record(&mut self, bucket: Bucket) {
        let slot = match bucket {
            Bucket::New => &mut self.new,
            Bucket::Review => &mut self.review,
            Bucket::Transfer => &mut self.transfer,
            Bucket::Bounce => &mut self.bounce,
        };
        *slot = slot.saturating_add(1);
    }

    /// Sum over all buckets
    pub fn total(&self) -> u32 {
        self.new
            .saturating_add(self.review)
            .saturating_add(self.transfer)
            .saturating_add(self.bounce)
    }

    /// Bucket-wise sum, used for cross-tenant totals
    pub fn merged(self, other: StatusCounts) -> StatusCounts {
        StatusCounts {
            new: self.new.saturating_add(other.new),
            review: self.review.saturating_add(other.review),
            transfer: self.transfer.saturating_add(other.transfer),
            bounce: self.bounce.saturating_add(other.bounce),
        }
    }
}

/// Table from upstream state name to canonical bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateMapping(HashMap<String, Bucket>);

impl StateMapping {
    /// Build a mapping from explicit entries
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, Bucket)>,
        S: Into<String>,
    {
        Self(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// The mapping shared by every known partner backend
    pub fn canonical() -> Self {
        Self::new([
            ("Withdraw-New", Bucket::New),
            ("Withdraw-In-Review", Bucket::Review),
            ("Withdraw-Approve", Bucket::Transfer),
            ("Withdraw-Approve-IR", Bucket::Transfer),
            ("Third-Party-Refusal", Bucket::Bounce),
        ])
    }

    /// Look up the bucket for a state name
    pub fn classify(&self, state_name: &str) -> Option<Bucket> {
        self.0.get(state_name).copied()
    }

    /// Fold result items into counts.
    ///
    /// Items whose `state.stateName` is missing or has no entry are skipped.
    pub fn count(&self, items: &[Value]) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for item in items {
            let Some(name) = item.pointer("/state/stateName").and_then(Value::as_str) else {
                tracing::debug!("Skipping result item without state name");
                continue;
            };
            match self.classify(name) {
                Some(bucket) => counts.record(bucket),
                None => tracing::debug!("Dropping unmapped state {:?}", name),
            }
        }
        counts
    }
}

impl Default for StateMapping {
    fn default() -> Self {
        Self::canonical()
    }
}

/// Ordered JSON pointers tried when unwrapping the result list
///
/// The relay sometimes re-wraps the payload under `data`, so the default
/// tries the bare path first and the wrapped one second.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultPaths(Vec<String>);

impl ResultPaths {
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(paths.into_iter().map(Into::into).collect())
    }

    /// Return the first path that resolves to an array, or an empty slice
    pub fn extract<'a>(&self, payload: &'a Value) -> &'a [Value] {
        self.0
            .iter()
            .find_map(|path| payload.pointer(path).and_then(Value::as_array))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

impl Default for ResultPaths {
    fn default() -> Self {
        Self::new(["/value/WTD/getResults", "/data/value/WTD/getResults"])
    }
}
