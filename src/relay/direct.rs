//! Direct relay
//!
//! Calls tenant endpoints straight from this process with a browser user
//! agent, applying the same header allow-list an external relay would.

use async_trait::async_trait;
use reqwest::{Client, header::CONTENT_TYPE};

use super::{Relay, RelayRequest, RelayResponse, filter_headers};
use crate::{Error, Result, config::settings::RelaySettings};

/// Relay that talks to tenants with its own HTTP client
#[derive(Debug, Clone)]
pub struct DirectRelay {
    client: Client,
}

impl DirectRelay {
    /// Build the HTTP client from relay settings
    pub fn new(settings: &RelaySettings) -> Result<Self> {
        let client = Client::builder()
            .user_agent(settings.user_agent.clone())
            .timeout(settings.timeout())
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Relay for DirectRelay {
    async fn send(&self, request: RelayRequest) -> Result<RelayResponse> {
        let headers = filter_headers(&request.headers);
        let has_content_type = headers
            .iter()
            .any(|(k, _)| k.eq_ignore_ascii_case(CONTENT_TYPE.as_str()));

        let mut builder = self
            .client
            .request(request.method.clone(), request.target.clone());
        if !has_content_type {
            builder = builder.header(CONTENT_TYPE, "application/json");
        }
        for (name, value) in headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        tracing::debug!("{} {}", request.method, request.target);
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
        if response.is_html() {
            return Err(Error::upstream_protocol(request.target.as_str(), &response.body));
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use url::Url;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn relay() -> DirectRelay {
        DirectRelay::new(&RelaySettings::default()).unwrap()
    }

    #[tokio::test]
    async fn test_forwards_allowed_headers_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/login"))
            .and(header("Referer", "https://bo.example"))
            .and(header("Content-Type", "application/json"))
            .and(body_json(json!({ "operatorName": "ops", "password": "pw" })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "data": { "token": "t1" } })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/api/login", server.uri())).unwrap();
        let request = RelayRequest::post(url, json!({ "operatorName": "ops", "password": "pw" }))
            .with_header("Referer", "https://bo.example")
            .with_header("X-Forwarded-For", "10.0.0.1");

        let response = relay().send(request).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.json().unwrap()["data"]["token"], "t1");

        let received = server.received_requests().await.unwrap();
        assert!(received[0].headers.get("x-forwarded-for").is_none());
    }

    #[tokio::test]
    async fn test_error_status_is_returned_not_raised() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/withdrawals"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(json!({ "errorCode": "INVALID_TOKEN" })),
            )
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/api/withdrawals", server.uri())).unwrap();
        let response = relay().send(RelayRequest::get(url)).await.unwrap();
        assert_eq!(response.status, 401);
        assert!(!response.is_success());
    }

    #[tokio::test]
    async fn test_html_is_protocol_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw("<html><body>Login</body></html>", "text/html; charset=utf-8"),
            )
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/api/withdrawals", server.uri())).unwrap();
        let err = relay().send(RelayRequest::get(url)).await.unwrap_err();
        assert!(matches!(err, Error::UpstreamProtocol { .. }));
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        let url = Url::parse("http://127.0.0.1:9/api/withdrawals").unwrap();
        let err = relay().send(RelayRequest::get(url)).await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }
}
