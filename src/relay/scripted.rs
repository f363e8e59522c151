//! Scripted relay for unit tests
//!
//! Responses are queued per `METHOD url-without-query`. The last queued
//! response for a route repeats once the others are used up. Every request is
//! recorded so tests can count calls exactly.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use super::{Relay, RelayRequest, RelayResponse};
use crate::{Error, Result};

#[derive(Debug, Default)]
pub(crate) struct ScriptedRelay {
    routes: Mutex<HashMap<String, VecDeque<RelayResponse>>>,
    calls: Mutex<Vec<RelayRequest>>,
}

fn route_key(method: &Method, url: &str) -> String {
    let trimmed = url.split('?').next().unwrap_or(url);
    format!("{} {}", method, trimmed)
}

impl ScriptedRelay {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Queue a response for a route
    pub(crate) fn on(&self, method: Method, url: &str, response: RelayResponse) -> &Self {
        self.routes
            .lock()
            .unwrap()
            .entry(route_key(&method, url))
            .or_default()
            .push_back(response);
        self
    }

    /// Queue a JSON response for a route
    pub(crate) fn on_json(&self, method: Method, url: &str, status: u16, body: Value) -> &Self {
        self.on(method, url, RelayResponse::from_json(status, &body))
    }

    pub(crate) fn calls(&self) -> Vec<RelayRequest> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of requests sent to a route
    pub(crate) fn count(&self, method: Method, url: &str) -> usize {
        let key = route_key(&method, url);
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|r| route_key(&r.method, r.target.as_str()) == key)
            .count()
    }
}

#[async_trait]
impl Relay for ScriptedRelay {
    async fn send(&self, request: RelayRequest) -> Result<RelayResponse> {
        let key = route_key(&request.method, request.target.as_str());
        self.calls.lock().unwrap().push(request);

        let mut routes = self.routes.lock().unwrap();
        let queue = routes
            .get_mut(&key)
            .ok_or_else(|| Error::internal(format!("no scripted response for {}", key)))?;
        let response = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        response.ok_or_else(|| Error::internal(format!("no scripted response for {}", key)))
    }
}
