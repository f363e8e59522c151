//! Tenant registry
//!
//! Static, immutable per-tenant configuration: credentials, endpoints and
//! display name. The registry is built once at startup and shared behind an
//! `Arc`; nothing mutates it afterwards.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use url::Url;

use crate::types::{ResultPaths, StateMapping, TenantId};
use crate::{Error, Result};

/// Format of the `Authorization` header sent with count requests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthScheme {
    /// The raw token
    #[default]
    Bare,
    /// `Bearer <token>`
    Bearer,
}

impl AuthScheme {
    /// Render the header value for a token
    pub fn header_value(&self, token: &str) -> String {
        match self {
            Self::Bare => token.to_string(),
            Self::Bearer => format!("Bearer {}", token),
        }
    }
}

/// One partner backend
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantConfig {
    pub id: TenantId,
    pub name: String,
    pub login_url: String,
    #[serde(alias = "getCountUrl")]
    pub count_url: String,
    pub referer: String,
    pub operator_name: String,
    pub password: String,
    #[serde(default)]
    pub auth_scheme: AuthScheme,
    /// Extra headers sent with the login request
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub login_headers: BTreeMap<String, String>,
    /// Overrides the canonical state mapping
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_mapping: Option<StateMapping>,
    /// Overrides where the result list is read from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_paths: Option<ResultPaths>,
    /// Page opened by the navigation router; defaults to `referer`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dashboard_url: Option<String>,
}

impl TenantConfig {
    /// Key used for the durable token tier
    pub fn storage_key(&self) -> String {
        self.name.to_lowercase()
    }

    /// Where the OTP code is verified
    pub fn otp_url(&self) -> String {
        format!("{}/tac/api/login/otp", self.referer.trim_end_matches('/'))
    }

    /// Page to open for this tenant
    pub fn dashboard_url(&self) -> &str {
        self.dashboard_url.as_deref().unwrap_or(&self.referer)
    }

    /// Count URL with `pageNo`/`maxResult` set, other query pairs kept
    pub fn count_url_for(&self, page: crate::types::Page) -> Result<Url> {
        let mut url = Url::parse(&self.count_url)?;
        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(k, _)| k != "pageNo" && k != "maxResult")
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        url.query_pairs_mut()
            .clear()
            .extend_pairs(kept)
            .append_pair("pageNo", &page.page_no.to_string())
            .append_pair("maxResult", &page.max_result.to_string());
        Ok(url)
    }

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::config(format!("tenant {} has an empty name", self.id)));
        }
        for (field, value) in [
            ("loginUrl", &self.login_url),
            ("countUrl", &self.count_url),
            ("referer", &self.referer),
        ] {
            Url::parse(value).map_err(|e| {
                Error::config(format!("tenant {} has an invalid {}: {}", self.name, field, e))
            })?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for TenantConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantConfig")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("login_url", &self.login_url)
            .field("count_url", &self.count_url)
            .field("referer", &self.referer)
            .field("operator_name", &self.operator_name)
            .field("password", &"<redacted>")
            .field("auth_scheme", &self.auth_scheme)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct TenantTable {
    #[serde(default)]
    tenants: Vec<TenantConfig>,
}

/// Immutable set of registered tenants
#[derive(Debug, Clone)]
pub struct SiteRegistry {
    tenants: BTreeMap<TenantId, TenantConfig>,
}

impl SiteRegistry {
    /// Build a registry, rejecting duplicates and malformed endpoints
    pub fn new(tenants: Vec<TenantConfig>) -> Result<Self> {
        if tenants.is_empty() {
            return Err(Error::config("no tenants configured"));
        }

        let mut names = HashSet::new();
        let mut map = BTreeMap::new();
        for tenant in tenants {
            tenant.validate()?;
            if !names.insert(tenant.storage_key()) {
                return Err(Error::config(format!("duplicate tenant name {}", tenant.name)));
            }
            let id = tenant.id;
            if map.insert(id, tenant).is_some() {
                return Err(Error::config(format!("duplicate tenant id {}", id)));
            }
        }
        Ok(Self { tenants: map })
    }

    /// Load tenants from a sites file.
    ///
    /// `.json` files hold a plain array of tenants; anything else is read as
    /// TOML with `[[tenants]]` tables.
    pub fn from_file(path: &Path) -> Result<Self> {
        Self::new(Self::read_file(path)?)
    }

    /// Read tenant entries from a sites file without validating them
    pub fn read_file(path: &Path) -> Result<Vec<TenantConfig>> {
        let contents = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Ok(serde_json::from_str(&contents)?)
        } else {
            Ok(toml::from_str::<TenantTable>(&contents)?.tenants)
        }
    }

    /// Look up a tenant
    pub fn get(&self, id: TenantId) -> Result<&TenantConfig> {
        self.tenants.get(&id).ok_or(Error::UnknownTenant { id })
    }

    /// Tenants in id order
    pub fn iter(&self) -> impl Iterator<Item = &TenantConfig> {
        self.tenants.values()
    }

    pub fn ids(&self) -> Vec<TenantId> {
        self.tenants.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.tenants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tenants.is_empty()
    }
}
