//! Wiring of adapters, record store, cache and mirror into one service.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use reqwest::Client;
use tracing::{debug, info, warn};
use trackhub_carrier_generic as generic;
use trackhub_carrier_nextsls as nextsls;
use trackhub_carrier_rtb56 as rtb56;
use trackhub_core::cache::{DisabledCache, MemoryCache, ResultCache};
use trackhub_core::model::{AgentId, TrackingNumber};
use trackhub_core::plugin::AdapterRegistry;
use trackhub_core::ports::{MirrorPort, ShipmentStore};
use trackhub_core::refresh::RefreshJob;
use trackhub_core::service::{BatchReport, TrackingQuery, TrackingService};
use trackhub_core::store::{MemoryStore, StoreSnapshot};
use trackhub_core::sync::{DownstreamSync, SyncReport};
use trackhub_mirror::RestMirror;

use crate::config::Config;

/// Adapter registry with every known carrier and the generic fallback.
#[must_use]
pub fn registry(client: &Client) -> AdapterRegistry {
    let plugins = vec![rtb56::plugin(client.clone()), nextsls::plugin(client.clone())];
    AdapterRegistry::new(plugins, generic::plugin(client.clone()))
}

/// Everything a command needs, built from the configuration.
pub struct App {
    service: Arc<TrackingService>,
    sync: Option<Arc<DownstreamSync>>,
    store: Arc<MemoryStore>,
    snapshot_path: PathBuf,
    config: Config,
}

impl App {
    /// Build the HTTP client, load the records and assemble the service.
    ///
    /// # Errors
    ///
    /// Fails when the HTTP client cannot be built, the snapshot is unreadable,
    /// or the mirror section is inconsistent.
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(config.http.user_agent.as_str())
            .timeout(config.http_timeout())
            .build()
            .context("Failed to build HTTP client")?;

        let store = Arc::new(load_store(&config.store.snapshot)?);
        let cache: Arc<dyn ResultCache> = if config.cache.ttl_secs == 0 {
            Arc::new(DisabledCache)
        } else {
            Arc::new(MemoryCache::new(config.cache_ttl()))
        };

        let registry = registry(&client);
        let adapters: Vec<String> = registry
            .adapters()
            .into_iter()
            .map(|meta| meta.id.0)
            .collect();
        info!(?adapters, "adapters_registered");

        let service = TrackingService::new(
            Arc::new(registry),
            Arc::clone(&store) as Arc<dyn ShipmentStore>,
            cache,
        )
        .with_carriers(config.carrier_configs())
        .with_batch_cap(config.batch.cap);

        let sync = config.mirror_settings()?.map(|settings| {
            info!(mirror = ?settings, "mirror_enabled");
            let mirror: Arc<dyn MirrorPort> = Arc::new(RestMirror::new(client.clone(), settings));
            Arc::new(DownstreamSync::new(mirror))
        });

        Ok(Self {
            service: Arc::new(service),
            sync,
            store,
            snapshot_path: config.store.snapshot.clone(),
            config,
        })
    }

    /// Resolve a batch query.
    ///
    /// # Errors
    ///
    /// Fails only when the shipment list for an empty query cannot be read.
    pub async fn track(&self, query: &TrackingQuery) -> anyhow::Result<BatchReport> {
        Ok(self.service.resolve_batch(query).await?)
    }

    /// Push clean results of known shipments to the mirror.
    ///
    /// # Errors
    ///
    /// Fails when the mirror is not enabled or a shipment lookup fails.
    pub async fn push(
        &self,
        report: &BatchReport,
    ) -> anyhow::Result<Vec<(TrackingNumber, SyncReport)>> {
        let Some(sync) = &self.sync else {
            anyhow::bail!("--sync needs [mirror] enabled = true in the configuration");
        };

        let mut pushed = Vec::new();
        for result in &report.results {
            if result.error.is_some() || result.is_empty() {
                continue;
            }
            let Some(shipment) = self
                .store
                .shipment_by_tracking_number(&result.tracking_number)
                .await?
            else {
                debug!(tracking_number = %result.tracking_number, "push_skipped_unknown_shipment");
                continue;
            };
            let outcome = sync.push(&shipment, &result.events).await;
            pushed.push((result.tracking_number.clone(), outcome));
        }
        Ok(pushed)
    }

    /// Deactivate an agent, unlink its shipments and write the snapshot back.
    ///
    /// # Errors
    ///
    /// Fails when the agent is unknown or already deactivated, or the snapshot
    /// cannot be written.
    pub async fn deactivate_agent(&self, id: AgentId) -> anyhow::Result<usize> {
        let unlinked = self.store.deactivate_agent(id).await?;
        save_store(&self.store, &self.snapshot_path)?;
        Ok(unlinked)
    }

    /// Periodic refresh job over this service and mirror.
    #[must_use]
    pub fn refresh_job(&self) -> RefreshJob {
        if self.sync.is_none() {
            warn!("mirror disabled; refresh passes will only warm the cache");
        }
        RefreshJob::new(
            Arc::clone(&self.service),
            self.sync.clone(),
            self.config.refresh_settings(),
        )
    }
}

fn load_store(path: &Path) -> anyhow::Result<MemoryStore> {
    if !path.exists() {
        warn!(path = %path.display(), "snapshot_missing_starting_empty");
        return Ok(MemoryStore::new(StoreSnapshot::default()));
    }

    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
    let store = MemoryStore::from_json(&raw)
        .with_context(|| format!("Failed to load snapshot {}", path.display()))?;
    info!(path = %path.display(), "snapshot_loaded");
    Ok(store)
}

fn save_store(store: &MemoryStore, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(path, store.to_json()?)
        .with_context(|| format!("Failed to write snapshot {}", path.display()))
}
