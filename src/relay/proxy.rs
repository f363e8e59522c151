//! Relay through an external proxy endpoint
//!
//! The proxy takes the target as `?target=<url>` and each forwarded header as
//! `header_<Name>=<value>`. It masks HTML answers as `502 {"valid": false}`
//! and its own transport failures as `500 {"error": …}`; the latter surface
//! as [`Error::RelayTransport`].

use async_trait::async_trait;
use reqwest::{Client, header::CONTENT_TYPE};
use serde_json::Value;
use url::Url;

use super::{Relay, RelayRequest, RelayResponse, filter_headers};
use crate::{Error, Result, config::settings::RelaySettings};

/// Relay that forwards through `/api/proxy`
#[derive(Debug, Clone)]
pub struct ProxyRelay {
    client: Client,
    endpoint: Url,
}

impl ProxyRelay {
    pub fn new(endpoint: &str, settings: &RelaySettings) -> Result<Self> {
        let client = Client::builder().timeout(settings.timeout()).build()?;
        Ok(Self {
            client,
            endpoint: Url::parse(endpoint)?,
        })
    }

    /// Proxy URL carrying target and headers as query parameters
    pub fn proxied_url(&self, request: &RelayRequest) -> Url {
        let mut url = self.endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("target", request.target.as_str());
            for (name, value) in filter_headers(&request.headers) {
                query.append_pair(&format!("header_{}", name), &value);
            }
        }
        url
    }
}

#[async_trait]
impl Relay for ProxyRelay {
    async fn send(&self, request: RelayRequest) -> Result<RelayResponse> {
        let url = self.proxied_url(&request);
        let mut builder = self.client.request(request.method.clone(), url);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        tracing::debug!("{} {} via proxy", request.method, request.target);
        let response = builder.send().await?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let body = response.text().await?;
        let response = RelayResponse::new(status, content_type, body);

        if response.is_html() || is_html_marker(&response) {
            return Err(Error::upstream_protocol(request.target.as_str(), &response.body));
        }
        if let Some(reason) = masked_transport_failure(&response) {
            tracing::debug!("Proxy could not reach {}: {}", request.target, reason);
            return Err(Error::relay_transport(reason));
        }
        Ok(response)
    }
}

/// The proxy's own fetch failure: a 500 with an `error` string and no
/// upstream `status`. A masked 401 carries `status` and passes through.
fn masked_transport_failure(response: &RelayResponse) -> Option<String> {
    if response.status != 500 {
        return None;
    }
    let payload = response.json().ok()?;
    if payload.get("status").is_some() {
        return None;
    }
    payload
        .get("error")
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn is_html_marker(response: &RelayResponse) -> bool {
    response.status == 502
        && response
            .json()
            .ok()
            .and_then(|v| v.get("valid").and_then(Value::as_bool))
            == Some(false)
}
