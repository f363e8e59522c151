//! Type definitions for the monitor
//!
//! This module contains the main data structures shared across components.

pub mod counts;
pub mod internal;
pub mod request;
pub mod response;

pub use counts::{Bucket, ResultPaths, StateMapping, StatusCounts};
pub use internal::{SessionToken, TenantId, TokenSource};
pub use request::{OtpSubmission, Page};
pub use response::{
    BatchReport, ErrorResponse, PendingOtp, PingResponse, PollResult, RouteResponse, Snapshot,
    SnapshotResponse,
};
