//! HTTP request handlers
//!
//! Implementation of HTTP endpoints for the monitor server.

use crate::{
    Error,
    server::app::AppState,
    types::{
        BatchReport, ErrorResponse, OtpSubmission, PendingOtp, PingResponse, PollResult,
        RouteResponse, SnapshotResponse, TenantId,
    },
    utils::version,
};
use axum::{
    Json as RequestJson,
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};

type ApiError = (StatusCode, Json<ErrorResponse>);
type ApiResult<T> = Result<Json<T>, ApiError>;

/// HTTP status for a monitor error
pub fn status_for(error: &Error) -> StatusCode {
    match error {
        Error::UnknownTenant { .. } => StatusCode::NOT_FOUND,
        Error::Login { .. } => StatusCode::UNAUTHORIZED,
        Error::InvalidToken { .. }
        | Error::UpstreamProtocol { .. }
        | Error::Upstream { .. }
        | Error::Transport(_)
        | Error::RelayTransport(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn api_error(error: &Error) -> ApiError {
    (status_for(error), Json(ErrorResponse::new(error.to_string())))
}

fn no_pending_prompt(tenant_id: TenantId) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse::new(format!(
            "No pending OTP prompt for tenant {}",
            tenant_id
        ))),
    )
}

/// Ping endpoint for health checks
///
/// GET /ping
pub async fn ping(State(state): State<AppState>) -> Json<PingResponse> {
    let uptime = state.start_time.elapsed().as_secs();
    tracing::debug!(
        "Ping response: uptime={}s, version={}",
        uptime,
        version::get_version()
    );
    Json(PingResponse::new(uptime, version::get_version()))
}

/// Aggregate snapshot
///
/// GET /snapshot
pub async fn snapshot(State(state): State<AppState>) -> Json<SnapshotResponse> {
    Json(state.orchestrator.snapshot().await.into())
}

/// Run one refresh batch now
///
/// POST /refresh
pub async fn refresh_all(State(state): State<AppState>) -> Json<BatchReport> {
    tracing::info!("Manual refresh requested");
    Json(state.orchestrator.refresh_all().await)
}

/// Refresh a single tenant
///
/// POST /tenants/{id}/refresh
pub async fn refresh_tenant(
    State(state): State<AppState>,
    Path(tenant_id): Path<TenantId>,
) -> ApiResult<PollResult> {
    state
        .orchestrator
        .refresh_tenant(tenant_id)
        .await
        .map(Json)
        .map_err(|e| api_error(&e))
}

/// Drop a tenant's token so the next fetch logs in again
///
/// DELETE /tenants/{id}/token
pub async fn invalidate_token(
    State(state): State<AppState>,
    Path(tenant_id): Path<TenantId>,
) -> Result<StatusCode, ApiError> {
    let fetcher = state.orchestrator.fetcher();
    let tenant = fetcher.registry().get(tenant_id).map_err(|e| api_error(&e))?;
    fetcher.auth().invalidate(tenant).await;
    Ok(StatusCode::NO_CONTENT)
}

/// Open or focus a tenant's dashboard
///
/// POST /tenants/{id}/open
pub async fn open_dashboard(
    State(state): State<AppState>,
    Path(tenant_id): Path<TenantId>,
) -> ApiResult<RouteResponse> {
    state
        .navigator
        .route(tenant_id)
        .map(Json)
        .map_err(|e| api_error(&e))
}

/// OTP prompts waiting for a code
///
/// GET /otp
pub async fn list_otp(State(state): State<AppState>) -> Json<Vec<PendingOtp>> {
    Json(
        state
            .prompter
            .as_ref()
            .map(|p| p.pending())
            .unwrap_or_default(),
    )
}

/// Answer a pending OTP prompt
///
/// POST /otp/{id}
pub async fn submit_otp(
    State(state): State<AppState>,
    Path(tenant_id): Path<TenantId>,
    RequestJson(submission): RequestJson<OtpSubmission>,
) -> Result<StatusCode, ApiError> {
    let code = submission.code.trim();
    if code.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("OTP code must not be empty")),
        ));
    }

    match &state.prompter {
        Some(prompter) if prompter.submit(tenant_id, code) => {
            tracing::info!("OTP submitted for tenant {}", tenant_id);
            Ok(StatusCode::ACCEPTED)
        }
        _ => Err(no_pending_prompt(tenant_id)),
    }
}

/// Cancel a pending OTP prompt
///
/// DELETE /otp/{id}
pub async fn cancel_otp(
    State(state): State<AppState>,
    Path(tenant_id): Path<TenantId>,
) -> Result<StatusCode, ApiError> {
    match &state.prompter {
        Some(prompter) if prompter.cancel(tenant_id) => {
            tracing::info!("OTP canceled for tenant {}", tenant_id);
            Ok(StatusCode::NO_CONTENT)
        }
        _ => Err(no_pending_prompt(tenant_id)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LoginFailure;
    use crate::config::registry::tests::tenant;
    use crate::config::{OtpSettings, SiteRegistry};
    use crate::monitor::RefreshOrchestrator;
    use crate::navigation::{NavigationRouter, WindowHandle, WindowHost};
    use crate::relay::scripted::ScriptedRelay;
    use crate::server::app::create_app;
    use crate::session::{AuthSession, ChannelPrompter, CountFetcher, TokenStore};
    use crate::types::{Page, SessionToken, TokenSource};
    use axum::body::Body;
    use axum::http::Request;
    use reqwest::Method;
    use rstest::rstest;
    use serde_json::{Value, json};
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    #[derive(Debug)]
    struct NoWindows;

    impl WindowHost for NoWindows {
        fn open(&self, _url: &str) -> crate::Result<Box<dyn WindowHandle>> {
            Err(Error::internal("no display"))
        }
    }

    fn test_state(relay: Arc<ScriptedRelay>) -> AppState {
        let prompter = ChannelPrompter::new();
        let auth = Arc::new(AuthSession::new(
            relay.clone(),
            Arc::new(TokenStore::in_memory()),
            Arc::new(prompter.clone()),
            &OtpSettings::default(),
        ));
        let registry = Arc::new(SiteRegistry::new(vec![tenant(1, "PG688")]).unwrap());
        let fetcher = CountFetcher::new(registry.clone(), auth, relay);
        let orchestrator = Arc::new(RefreshOrchestrator::new(
            fetcher,
            Page::default(),
            Duration::from_secs(60),
        ));
        let navigator = Arc::new(NavigationRouter::new(registry, Arc::new(NoWindows)));
        AppState::new(orchestrator, Some(prompter), navigator)
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn request(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    #[rstest]
    #[case(Error::UnknownTenant { id: 3 }, StatusCode::NOT_FOUND)]
    #[case(Error::login("PG688", LoginFailure::OtpCanceled), StatusCode::UNAUTHORIZED)]
    #[case(Error::invalid_token("PG688"), StatusCode::BAD_GATEWAY)]
    #[case(Error::upstream(503, "down"), StatusCode::BAD_GATEWAY)]
    #[case(Error::upstream_protocol("https://x", "<html>"), StatusCode::BAD_GATEWAY)]
    #[case(Error::relay_transport("fetch failed"), StatusCode::BAD_GATEWAY)]
    #[case(Error::storage("write"), StatusCode::INTERNAL_SERVER_ERROR)]
    fn test_status_mapping(#[case] error: Error, #[case] expected: StatusCode) {
        assert_eq!(status_for(&error), expected);
    }

    #[tokio::test]
    async fn test_ping() {
        let app = create_app(test_state(Arc::new(ScriptedRelay::new())));
        let response = app.oneshot(request("GET", "/ping")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["version"], version::get_version());
    }

    #[tokio::test]
    async fn test_refresh_then_snapshot() {
        let relay = Arc::new(ScriptedRelay::new());
        relay.on_json(
            Method::POST,
            "https://pg688.example/api/login",
            200,
            json!({ "token": "t" }),
        );
        relay.on_json(
            Method::GET,
            "https://pg688.example/api/withdrawals",
            200,
            json!({ "value": { "WTD": { "getResults": [
                { "state": { "stateName": "Withdraw-New" } }
            ] } } }),
        );
        let app = create_app(test_state(relay));

        let response = app
            .clone()
            .oneshot(request("POST", "/refresh"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let report = body_json(response).await;
        assert_eq!(report["succeeded"], json!([1]));
        assert_eq!(report["generation"], 1);

        let response = app.oneshot(request("GET", "/snapshot")).await.unwrap();
        let body = body_json(response).await;
        assert_eq!(body["generation"], 1);
        assert_eq!(body["tenants"]["1"]["counts"]["new"], 1);
        assert_eq!(body["tenants"]["1"]["success"], true);
        assert_eq!(
            body["totals"],
            json!({ "new": 1, "review": 0, "transfer": 0, "bounce": 0 })
        );
    }

    #[tokio::test]
    async fn test_refresh_unknown_tenant_is_404() {
        let app = create_app(test_state(Arc::new(ScriptedRelay::new())));
        let response = app
            .oneshot(request("POST", "/tenants/77/refresh"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Site config not found for ID 77");
    }

    #[tokio::test]
    async fn test_upstream_failure_is_502() {
        let relay = Arc::new(ScriptedRelay::new());
        relay.on_json(
            Method::GET,
            "https://pg688.example/api/withdrawals",
            503,
            json!({ "message": "maintenance" }),
        );
        let state = test_state(relay);
        let config = tenant(1, "PG688");
        state
            .orchestrator
            .fetcher()
            .auth()
            .store()
            .set(&config, SessionToken::new(1, "t", TokenSource::Password))
            .await;

        let response = create_app(state)
            .oneshot(request("POST", "/tenants/1/refresh"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_invalidate_token() {
        let state = test_state(Arc::new(ScriptedRelay::new()));
        let config = tenant(1, "PG688");
        let store = state.orchestrator.fetcher().auth().store().clone();
        store
            .set(&config, SessionToken::new(1, "t", TokenSource::Password))
            .await;

        let response = create_app(state)
            .oneshot(request("DELETE", "/tenants/1/token"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(store.get(&config).await.is_none());
    }

    #[tokio::test]
    async fn test_open_without_display_is_500() {
        let app = create_app(test_state(Arc::new(ScriptedRelay::new())));
        let response = app
            .oneshot(request("POST", "/tenants/1/open"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_otp_over_http() {
        let relay = Arc::new(ScriptedRelay::new());
        relay.on_json(
            Method::POST,
            "https://pg688.example/api/login",
            200,
            json!({ "data": { "needOtp": true } }),
        );
        relay.on_json(
            Method::POST,
            "https://pg688.example/tac/api/login/otp",
            200,
            json!({ "data": { "token": "otp-token" } }),
        );
        let state = test_state(relay);
        let app = create_app(state.clone());

        let login = {
            let auth = state.orchestrator.fetcher().auth().clone();
            tokio::spawn(async move { auth.ensure_token(&tenant(1, "PG688")).await })
        };

        let mut listed = Value::Null;
        for _ in 0..200 {
            let response = app.clone().oneshot(request("GET", "/otp")).await.unwrap();
            listed = body_json(response).await;
            if listed.as_array().is_some_and(|a| !a.is_empty()) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(listed[0]["tenantId"], 1);
        assert_eq!(listed[0]["siteName"], "PG688");

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/otp/1")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"code":"123456"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let token = login.await.unwrap().unwrap();
        assert_eq!(token.value, "otp-token");

        let response = app.oneshot(request("DELETE", "/otp/1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
