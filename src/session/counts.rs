//! Withdrawal count fetching
//!
//! [`CountFetcher`] reads one page of a tenant's withdrawal list and reduces
//! it to [`StatusCounts`]. A rejected token is replaced by exactly one fresh
//! login and the fetch retried exactly once.

use serde_json::Value;
use std::sync::Arc;

use super::auth::{AuthSession, error_code, error_message};
use crate::{
    Error, Result,
    config::{SiteRegistry, TenantConfig},
    relay::{Relay, RelayRequest, RelayResponse},
    types::{Page, ResultPaths, SessionToken, StateMapping, StatusCounts, TenantId},
};

/// Whether a response means the backend no longer accepts the token.
///
/// Besides a plain 401 the backends report `INVALID_TOKEN` in the body, and
/// some relays mask the 401 as a 500 whose body carries `status: 401`.
pub fn is_invalid_token(response: &RelayResponse, payload: &Value) -> bool {
    response.status == 401
        || error_code(payload) == Some("INVALID_TOKEN")
        || (response.status == 500
            && payload.get("status").and_then(Value::as_u64) == Some(401))
}

/// Fetches and classifies withdrawal states for registered tenants
#[derive(Debug, Clone)]
pub struct CountFetcher {
    registry: Arc<SiteRegistry>,
    auth: Arc<AuthSession>,
    relay: Arc<dyn Relay>,
}

impl CountFetcher {
    pub fn new(registry: Arc<SiteRegistry>, auth: Arc<AuthSession>, relay: Arc<dyn Relay>) -> Self {
        Self {
            registry,
            auth,
            relay,
        }
    }

    pub fn registry(&self) -> &Arc<SiteRegistry> {
        &self.registry
    }

    pub fn auth(&self) -> &Arc<AuthSession> {
        &self.auth
    }

    /// Counts per bucket for one page of a tenant's withdrawals
    pub async fn fetch_counts(&self, tenant_id: TenantId, page: Page) -> Result<StatusCounts> {
        let tenant = self.registry.get(tenant_id)?;
        let token = self.auth.ensure_token(tenant).await?;

        match self.fetch_once(tenant, &token, page).await {
            Err(Error::InvalidToken { .. }) => {
                tracing::warn!(
                    "Token invalid for {} after {}s, logging in again",
                    tenant.name,
                    token.age().num_seconds()
                );
                let fresh = self.auth.refresh_token(tenant, &token).await?;
                self.fetch_once(tenant, &fresh, page).await
            }
            result => result,
        }
    }

    async fn fetch_once(
        &self,
        tenant: &TenantConfig,
        token: &SessionToken,
        page: Page,
    ) -> Result<StatusCounts> {
        let url = tenant.count_url_for(page)?;
        tracing::debug!("Fetching counts for {} from {}", tenant.name, url);

        let request = RelayRequest::get(url)
            .with_header("Authorization", tenant.auth_scheme.header_value(&token.value))
            .with_header("Referer", tenant.referer.as_str());
        let response = self.relay.send(request).await?;

        let payload = response.json().unwrap_or(Value::Null);
        if is_invalid_token(&response, &payload) {
            return Err(Error::invalid_token(&tenant.name));
        }
        if !response.is_success() {
            return Err(Error::upstream(
                response.status,
                error_message(&response, &payload),
            ));
        }

        // A 2xx body that is not JSON is an error, not an empty list
        let payload = response.json()?;
        let items = match &tenant.result_paths {
            Some(paths) => paths.extract(&payload),
            None => ResultPaths::default().extract(&payload),
        };
        let counts = match &tenant.state_mapping {
            Some(mapping) => mapping.count(items),
            None => StateMapping::canonical().count(items),
        };

        tracing::debug!(
            "{}: {} items, {} counted",
            tenant.name,
            items.len(),
            counts.total()
        );
        Ok(counts)
    }
}
