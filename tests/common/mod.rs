//! Common test utilities and helpers
//!
//! This module provides shared utilities for integration tests.

#![allow(dead_code)]

use serde_json::{Value, json};
use withdrawal_monitor::TenantConfig;

/// Tenant whose endpoints all live on a mock server
pub fn tenant_on(server_uri: &str, id: u32, name: &str) -> TenantConfig {
    serde_json::from_value(json!({
        "id": id,
        "name": name,
        "loginUrl": format!("{server_uri}/{id}/api/login"),
        "getCountUrl": format!("{server_uri}/{id}/api/withdrawals?pageNo=9&channel=bank"),
        "referer": format!("{server_uri}/{id}"),
        "operatorName": "ops",
        "password": "secret",
        "authScheme": "bearer",
    }))
    .expect("valid tenant json")
}

/// Count response in the bare shape
pub fn results(states: &[&str]) -> Value {
    let items: Vec<Value> = states
        .iter()
        .map(|s| json!({ "state": { "stateName": s } }))
        .collect();
    json!({ "value": { "WTD": { "getResults": items } } })
}
