//! Tenant login
//!
//! [`AuthSession`] turns tenant credentials into a session token. A login
//! POSTs `{operatorName, password}` to the tenant's login URL. The backend
//! either answers with a token (at `data.token` or `token`) or asks for a
//! one-time passcode, in which case the OTP collaborator is consulted and the
//! code is verified at `<referer>/tac/api/login/otp`.
//!
//! Logins for one tenant are serialized; concurrent callers that find the
//! cache empty wait for the first login and reuse its token.

use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use url::Url;

use super::otp::{OtpOutcome, OtpPrompter, OtpRequest};
use super::store::TokenStore;
use crate::{
    Error, LoginFailure, Result,
    config::{OtpSettings, TenantConfig},
    relay::{Relay, RelayRequest, RelayResponse},
    types::{SessionToken, TenantId, TokenSource},
};

const OTP_REJECTED_HINT: &str = "Invalid or expired OTP. Please try again.";

/// Token at `data.token`, else at `token`
pub fn extract_token(payload: &Value) -> Option<String> {
    ["/data/token", "/token"]
        .iter()
        .filter_map(|path| payload.pointer(path).and_then(Value::as_str))
        .find(|token| !token.is_empty())
        .map(str::to_string)
}

/// Whether a login response asks for OTP verification
pub fn requires_otp(payload: &Value) -> bool {
    let flagged = ["/data/needOtp", "/needOtp"]
        .iter()
        .any(|path| payload.pointer(path).and_then(Value::as_bool) == Some(true));
    flagged || error_code(payload).is_some_and(|code| code.contains("OTP"))
}

/// Upstream error code at `errorCode`, else at `data.errorCode`
pub fn error_code(payload: &Value) -> Option<&str> {
    ["/errorCode", "/data/errorCode"]
        .iter()
        .find_map(|path| payload.pointer(path).and_then(Value::as_str))
}

/// Best-effort human readable message from an error body
pub(crate) fn error_message(response: &RelayResponse, payload: &Value) -> String {
    ["/message", "/error", "/data/message", "/errorCode"]
        .iter()
        .find_map(|path| payload.pointer(path).and_then(Value::as_str))
        .map(str::to_string)
        .unwrap_or_else(|| response.body.chars().take(200).collect())
}

/// Logs tenants in and keeps their tokens in the [`TokenStore`]
#[derive(Debug)]
pub struct AuthSession {
    relay: Arc<dyn Relay>,
    store: Arc<TokenStore>,
    otp: Arc<dyn OtpPrompter>,
    otp_timeout: Duration,
    otp_max_attempts: u32,
    login_locks: Mutex<HashMap<TenantId, Arc<Mutex<()>>>>,
}

impl AuthSession {
    pub fn new(
        relay: Arc<dyn Relay>,
        store: Arc<TokenStore>,
        otp: Arc<dyn OtpPrompter>,
        otp_settings: &OtpSettings,
    ) -> Self {
        Self {
            relay,
            store,
            otp,
            otp_timeout: otp_settings.timeout(),
            otp_max_attempts: otp_settings.max_attempts.max(1),
            login_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<TokenStore> {
        &self.store
    }

    /// Cached token, or a fresh login when there is none
    pub async fn ensure_token(&self, tenant: &TenantConfig) -> Result<SessionToken> {
        if let Some(token) = self.store.get(tenant).await {
            return Ok(token);
        }

        let lock = self.login_lock(tenant.id).await;
        let _guard = lock.lock().await;
        if let Some(token) = self.store.get(tenant).await {
            tracing::debug!("{} token appeared while waiting for login", tenant.name);
            return Ok(token);
        }
        self.login(tenant).await
    }

    /// Replace a token the backend rejected.
    ///
    /// Clears the stored token and logs in again, unless another task has
    /// already swapped `stale` for a newer token, which is then returned.
    pub async fn refresh_token(
        &self,
        tenant: &TenantConfig,
        stale: &SessionToken,
    ) -> Result<SessionToken> {
        let lock = self.login_lock(tenant.id).await;
        let _guard = lock.lock().await;
        if let Some(current) = self.store.get(tenant).await
            && current.value != stale.value
        {
            tracing::debug!("{} token already refreshed by another task", tenant.name);
            return Ok(current);
        }
        self.store.clear(tenant).await;
        self.login(tenant).await
    }

    /// Forget a tenant's token
    pub async fn invalidate(&self, tenant: &TenantConfig) {
        tracing::info!("Invalidating token for {}", tenant.name);
        self.store.clear(tenant).await;
    }

    async fn login_lock(&self, tenant_id: TenantId) -> Arc<Mutex<()>> {
        self.login_locks
            .lock()
            .await
            .entry(tenant_id)
            .or_default()
            .clone()
    }

    /// Password login, escalating to OTP when the backend asks for it
    async fn login(&self, tenant: &TenantConfig) -> Result<SessionToken> {
        tracing::info!("Logging in for {}...", tenant.name);

        let mut request = RelayRequest::post(
            Url::parse(&tenant.login_url)?,
            json!({
                "operatorName": tenant.operator_name,
                "password": tenant.password,
            }),
        )
        .with_header("Referer", tenant.referer.as_str());
        for (name, value) in &tenant.login_headers {
            request = request.with_header(name.as_str(), value.as_str());
        }

        let response = self.relay.send(request).await?;
        let payload = response.json().unwrap_or(Value::Null);

        if requires_otp(&payload) {
            tracing::warn!("{} requires OTP authentication", tenant.name);
            return self.login_with_otp(tenant).await;
        }

        if let Some(token) = extract_token(&payload) {
            let token = SessionToken::new(tenant.id, token, TokenSource::Password);
            self.store.set(tenant, token.clone()).await;
            tracing::info!("Login success: {}", tenant.name);
            return Ok(token);
        }

        if !response.is_success() {
            return Err(Error::upstream(
                response.status,
                error_message(&response, &payload),
            ));
        }
        Err(Error::login(&tenant.name, LoginFailure::MissingToken))
    }

    async fn login_with_otp(&self, tenant: &TenantConfig) -> Result<SessionToken> {
        let otp_url = Url::parse(&tenant.otp_url())?;
        let mut hint = None;

        for attempt in 1..=self.otp_max_attempts {
            let request = OtpRequest {
                tenant_id: tenant.id,
                site_name: tenant.name.clone(),
                referer: tenant.referer.clone(),
                operator_name: tenant.operator_name.clone(),
                attempt,
                hint: hint.take(),
            };

            let code = match tokio::time::timeout(self.otp_timeout, self.otp.prompt(request)).await
            {
                Ok(OtpOutcome::Code(code)) => code,
                Ok(OtpOutcome::Canceled) => {
                    tracing::warn!("{}: OTP canceled.", tenant.name);
                    return Err(Error::login(&tenant.name, LoginFailure::OtpCanceled));
                }
                Err(_) => {
                    tracing::warn!("{}: OTP prompt timed out", tenant.name);
                    return Err(Error::login(
                        &tenant.name,
                        LoginFailure::OtpTimedOut {
                            seconds: self.otp_timeout.as_secs(),
                        },
                    ));
                }
            };

            let request = RelayRequest::post(
                otp_url.clone(),
                json!({
                    "operatorName": tenant.operator_name,
                    "code": code,
                }),
            )
            .with_header("Referer", tenant.referer.as_str());

            let response = self.relay.send(request).await?;
            let payload = response.json().unwrap_or(Value::Null);
            if let Some(token) = extract_token(&payload) {
                let token = SessionToken::new(tenant.id, token, TokenSource::Otp);
                self.store.set(tenant, token.clone()).await;
                tracing::info!("OTP success for {}", tenant.name);
                return Ok(token);
            }

            tracing::warn!(
                "{}: OTP attempt {} refused (status {})",
                tenant.name,
                attempt,
                response.status
            );
            hint = Some(OTP_REJECTED_HINT.to_string());
        }

        Err(Error::login(
            &tenant.name,
            LoginFailure::OtpRejected {
                attempts: self.otp_max_attempts,
            },
        ))
    }
}
