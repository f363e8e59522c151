//! Periodic refresh of every tenant's counts
//!
//! Each batch fetches all registered tenants concurrently and merges the
//! outcomes into one [`Snapshot`] once the whole batch has settled. A failing
//! tenant keeps its previous counts and never holds up the others.

use chrono::Utc;
use futures_util::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::{
    Error, Result,
    session::CountFetcher,
    types::{BatchReport, Page, PollResult, Snapshot, TenantId},
};

/// Runs refresh batches and holds the aggregate view
#[derive(Debug)]
pub struct RefreshOrchestrator {
    fetcher: CountFetcher,
    page: Page,
    interval: Duration,
    snapshot: RwLock<Snapshot>,
}

impl RefreshOrchestrator {
    pub fn new(fetcher: CountFetcher, page: Page, interval: Duration) -> Self {
        Self {
            fetcher,
            page,
            interval,
            snapshot: RwLock::new(Snapshot::default()),
        }
    }

    pub fn fetcher(&self) -> &CountFetcher {
        &self.fetcher
    }

    /// Copy of the current aggregate view
    pub async fn snapshot(&self) -> Snapshot {
        self.snapshot.read().await.clone()
    }

    /// Fetch every tenant once and merge the results
    pub async fn refresh_all(&self) -> BatchReport {
        let registry = self.fetcher.registry().clone();
        let outcomes = join_all(registry.iter().map(|tenant| async move {
            let result = self.fetcher.fetch_counts(tenant.id, self.page).await;
            (tenant, result, Utc::now())
        }))
        .await;

        let mut succeeded = Vec::new();
        let mut failed = BTreeMap::new();
        let mut snapshot = self.snapshot.write().await;
        for (tenant, result, at) in outcomes {
            match result {
                Ok(counts) => {
                    snapshot.record_success(tenant.id, &tenant.name, counts, at);
                    succeeded.push(tenant.id);
                }
                Err(e) => {
                    log_failure(&tenant.name, &e);
                    snapshot.record_failure(tenant.id, &tenant.name, e.to_string(), at);
                    failed.insert(tenant.id, e.to_string());
                }
            }
        }

        let completed_at = Utc::now();
        snapshot.mark_settled(completed_at);
        tracing::info!(
            "Refresh batch {} done: {} ok, {} failed",
            snapshot.generation,
            succeeded.len(),
            failed.len()
        );

        BatchReport {
            succeeded,
            failed,
            completed_at,
            generation: snapshot.generation,
        }
    }

    /// Refresh a single tenant outside the batch cycle.
    ///
    /// The outcome is merged like a batch entry but does not close a batch.
    pub async fn refresh_tenant(&self, tenant_id: TenantId) -> Result<PollResult> {
        let tenant = self.fetcher.registry().get(tenant_id)?;
        let result = self.fetcher.fetch_counts(tenant_id, self.page).await;
        let at = Utc::now();

        let mut snapshot = self.snapshot.write().await;
        match result {
            Ok(counts) => {
                snapshot.record_success(tenant.id, &tenant.name, counts, at);
                tracing::info!("Refreshed {}", tenant.name);
            }
            Err(e) => {
                log_failure(&tenant.name, &e);
                snapshot.record_failure(tenant.id, &tenant.name, e.to_string(), at);
                return Err(e);
            }
        }
        snapshot
            .tenants
            .get(&tenant_id)
            .cloned()
            .ok_or(crate::Error::UnknownTenant { id: tenant_id })
    }

    /// Run a batch now and then every interval until `cancel` fires
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            tracing::info!(
                "Refreshing {} tenant(s) every {}s",
                self.fetcher.registry().len(),
                self.interval.as_secs()
            );

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = self.refresh_all() => {}
                }
            }
            tracing::info!("Refresh loop stopped");
        })
    }
}

/// Login failures are warnings; everything else is an error
fn log_failure(tenant: &str, error: &Error) {
    if error.is_terminal_login() {
        tracing::warn!("Login for {} needs attention: {}", tenant, error);
    } else {
        tracing::error!("Refresh failed for {}: {}", tenant, error);
    }
}
