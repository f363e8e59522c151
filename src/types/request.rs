//! Request type definitions
//!
//! Pagination for count fetches and the bodies accepted by the HTTP API.

use serde::{Deserialize, Serialize};

/// Pagination parameters merged into a tenant's count URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    /// 1-based page number (`pageNo`)
    pub page_no: u32,
    /// Page size (`maxResult`)
    pub max_result: u32,
}

impl Page {
    pub fn new(page_no: u32, max_result: u32) -> Self {
        Self {
            page_no,
            max_result,
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self {
            page_no: 1,
            max_result: 50,
        }
    }
}

/// OTP code submitted for a pending prompt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtpSubmission {
    /// The code as typed by the operator
    pub code: String,
}
