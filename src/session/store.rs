//! Two-tier token store
//!
//! A memory map from tenant id to [`SessionToken`] in front of a durable
//! key-value tier keyed by the lowercased tenant name. Reads fall through to
//! the durable tier and re-populate memory; writes and clears go to both.
//! There is no TTL: a stale token is only discovered when a backend rejects
//! it.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::{Mutex, RwLock};

use crate::{
    Error, Result,
    config::TenantConfig,
    types::{SessionToken, TenantId, TokenSource},
};

/// Durable key-value tier holding raw token strings
#[async_trait]
pub trait DurableStore: Send + Sync + std::fmt::Debug {
    async fn load(&self, key: &str) -> Result<Option<String>>;
    async fn store(&self, key: &str, value: &str) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
}

/// In-process durable tier, used when persistence is off
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    async fn load(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn store(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

/// JSON file holding `{ "<tenant name>": "<token>" }`
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles on the file
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<HashMap<String, String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) if contents.trim().is_empty() => Ok(HashMap::new()),
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Write the whole map atomically (temp file + rename)
    async fn write_all(&self, entries: &HashMap<String, String>) -> Result<()> {
        static COUNTER: AtomicU32 = AtomicU32::new(0);

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file_name = self
            .path
            .file_name()
            .ok_or_else(|| Error::storage(format!("invalid token file {:?}", self.path)))?;
        let tmp_path = self.path.with_file_name(format!(
            "{}.{}.{}.tmp",
            file_name.to_string_lossy(),
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::Relaxed),
        ));

        let json = serde_json::to_string_pretty(entries)?;
        tokio::fs::write(&tmp_path, json).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl DurableStore for FileStore {
    async fn load(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.lock.lock().await;
        Ok(self.read_all().await?.get(key).cloned())
    }

    async fn store(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut entries = self.read_all().await?;
        entries.insert(key.to_string(), value.to_string());
        self.write_all(&entries).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut entries = self.read_all().await?;
        if entries.remove(key).is_some() {
            self.write_all(&entries).await?;
        }
        Ok(())
    }
}

/// Memory tier plus a per-tenant version bumped by every `set`/`clear`
#[derive(Debug, Default)]
struct MemoryTier {
    tokens: HashMap<TenantId, SessionToken>,
    versions: HashMap<TenantId, u64>,
}

impl MemoryTier {
    fn version(&self, tenant_id: TenantId) -> u64 {
        self.versions.get(&tenant_id).copied().unwrap_or_default()
    }

    fn bump(&mut self, tenant_id: TenantId) {
        *self.versions.entry(tenant_id).or_default() += 1;
    }
}

/// Current session token per tenant
///
/// `set` and `clear` write the durable tier first and then swap the memory
/// entry under the write lock. A durable read only re-populates memory when
/// no `set` or `clear` landed while it was in flight.
#[derive(Debug)]
pub struct TokenStore {
    memory: RwLock<MemoryTier>,
    durable: Arc<dyn DurableStore>,
}

impl TokenStore {
    pub fn new(durable: Arc<dyn DurableStore>) -> Self {
        Self {
            memory: RwLock::new(MemoryTier::default()),
            durable,
        }
    }

    /// Store with an in-process durable tier
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// Cached token for a tenant, restoring it from the durable tier if needed
    pub async fn get(&self, tenant: &TenantConfig) -> Option<SessionToken> {
        let version = {
            let memory = self.memory.read().await;
            if let Some(token) = memory.tokens.get(&tenant.id) {
                return Some(token.clone());
            }
            memory.version(tenant.id)
        };

        let value = match self.durable.load(&tenant.storage_key()).await {
            Ok(Some(value)) if !value.is_empty() => value,
            Ok(_) => return None,
            Err(e) => {
                tracing::warn!("Failed to read stored token for {}: {}", tenant.name, e);
                return None;
            }
        };

        let mut memory = self.memory.write().await;
        if memory.version(tenant.id) != version {
            tracing::debug!("{} token changed during durable read", tenant.name);
            return memory.tokens.get(&tenant.id).cloned();
        }
        tracing::debug!("Restored {} token from durable store", tenant.name);
        let token = SessionToken::new(tenant.id, value, TokenSource::Restored);
        memory.tokens.insert(tenant.id, token.clone());
        Some(token)
    }

    /// Replace a tenant's token in both tiers
    pub async fn set(&self, tenant: &TenantConfig, token: SessionToken) {
        if let Err(e) = self.durable.store(&tenant.storage_key(), &token.value).await {
            tracing::warn!("Failed to persist token for {}: {}", tenant.name, e);
        }
        let mut memory = self.memory.write().await;
        memory.bump(tenant.id);
        memory.tokens.insert(tenant.id, token);
    }

    /// Drop a tenant's token from both tiers
    pub async fn clear(&self, tenant: &TenantConfig) {
        if let Err(e) = self.durable.remove(&tenant.storage_key()).await {
            tracing::warn!("Failed to remove stored token for {}: {}", tenant.name, e);
        }
        let mut memory = self.memory.write().await;
        memory.bump(tenant.id);
        memory.tokens.remove(&tenant.id);
    }

    /// Whether the memory tier holds a token for the tenant
    #[cfg(test)]
    pub async fn is_cached(&self, tenant_id: TenantId) -> bool {
        self.memory.read().await.tokens.contains_key(&tenant_id)
    }
}
