//! Configuration loading from TOML files.
//!
//! The file is selected with `--config` (or `TRACKHUB_CONFIG`) and defaults to
//! `config/trackhub.toml`. A missing file yields the built-in defaults.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use chrono::TimeDelta;
use serde::Deserialize;
use tracing::warn;
use trackhub_core::model::{CarrierConfig, CarrierCredentials, CarrierId};
use trackhub_core::refresh::{MIN_INTERVAL, RefreshSettings};
use trackhub_core::service::DEFAULT_BATCH_CAP;
use trackhub_mirror::MirrorSettings;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
/// Outbound HTTP settings shared by every adapter.
pub struct HttpConfig {
    /// Per-request timeout.
    pub timeout_secs: u64,
    /// `User-Agent` header.
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 15,
            user_agent: String::from("trackhub/0.1"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
/// Result cache settings; a TTL of zero disables caching.
pub struct CacheConfig {
    /// Entry lifetime.
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_secs: 600 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
/// Batch query settings.
pub struct BatchConfig {
    /// Numbers processed per query.
    pub cap: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            cap: DEFAULT_BATCH_CAP,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
/// Where shipment, agent and manual event records come from.
pub struct StoreConfig {
    /// JSON snapshot file.
    pub snapshot: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            snapshot: PathBuf::from("data/records.json"),
        }
    }
}

#[derive(Clone, Deserialize, Default)]
#[serde(default)]
/// Downstream mirror connection.
pub struct MirrorConfig {
    /// Whether events are pushed at all.
    pub enabled: bool,
    /// REST root of the mirror.
    pub base_url: String,
    /// `apikey` header value.
    pub api_key: String,
    /// Bearer token.
    pub token: String,
    /// Event table; the mirror's default applies when unset.
    pub events_table: Option<String>,
    /// Shipment table; the mirror's default applies when unset.
    pub shipments_table: Option<String>,
}

impl fmt::Debug for MirrorConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("MirrorConfig")
            .field("enabled", &self.enabled)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
/// Periodic refresh job settings.
pub struct RefreshConfig {
    /// Time between passes.
    pub interval_secs: u64,
    /// Age limit of refreshed shipments.
    pub lookback_days: i64,
    /// Pause between two shipments.
    pub item_delay_ms: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30 * 60,
            lookback_days: 7,
            item_delay_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
/// Environment-level carrier addressable by id.
pub struct CarrierEntry {
    /// Display name.
    pub name: String,
    /// Endpoint URL; also picks the adapter.
    pub base_url: String,
    /// Credentials.
    pub auth: CarrierCredentials,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
/// Complete configuration of the binary.
pub struct Config {
    /// Outbound HTTP.
    pub http: HttpConfig,
    /// Result cache.
    pub cache: CacheConfig,
    /// Batch queries.
    pub batch: BatchConfig,
    /// Record store.
    pub store: StoreConfig,
    /// Downstream mirror.
    pub mirror: MirrorConfig,
    /// Refresh job.
    pub refresh: RefreshConfig,
    /// Environment carriers by id.
    pub carriers: BTreeMap<String, CarrierEntry>,
}

impl Config {
    /// Read and parse a configuration file.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be read, is not valid TOML for this
    /// structure, or holds values rejected by [`Config::validate`].
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(config)
    }

    /// Reject values that would stall or crash the binary later on.
    ///
    /// # Errors
    ///
    /// Fails on a zero HTTP timeout, a zero batch cap, a refresh interval
    /// below one second, or a lookback that is not a positive number of days
    /// chrono can represent.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.http.timeout_secs == 0 {
            bail!("[http] timeout_secs must be at least 1");
        }
        if self.batch.cap == 0 {
            bail!("[batch] cap must be at least 1");
        }
        if Duration::from_secs(self.refresh.interval_secs) < MIN_INTERVAL {
            bail!("[refresh] interval_secs must be at least {}", MIN_INTERVAL.as_secs());
        }
        let lookback = TimeDelta::try_days(self.refresh.lookback_days);
        if self.refresh.lookback_days <= 0 || lookback.is_none() {
            bail!(
                "[refresh] lookback_days must be between 1 and {}",
                TimeDelta::MAX.num_days()
            );
        }
        Ok(())
    }

    /// Like [`Config::from_file`], but a missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Fails when an existing file cannot be read, parsed or validated.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            warn!(path = %path.display(), "config_missing_using_defaults");
            return Ok(Self::default());
        }
        Self::from_file(path)
    }

    /// Outbound request timeout.
    #[must_use]
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http.timeout_secs)
    }

    /// Cache entry lifetime.
    #[must_use]
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_secs)
    }

    /// Refresh job settings.
    #[must_use]
    pub fn refresh_settings(&self) -> RefreshSettings {
        RefreshSettings {
            interval: Duration::from_secs(self.refresh.interval_secs),
            lookback: TimeDelta::try_days(self.refresh.lookback_days).unwrap_or(TimeDelta::MAX),
            item_delay: Duration::from_millis(self.refresh.item_delay_ms),
        }
    }

    /// Environment carriers, ordered by id.
    #[must_use]
    pub fn carrier_configs(&self) -> Vec<CarrierConfig> {
        self.carriers
            .iter()
            .map(|(id, entry)| CarrierConfig {
                id: CarrierId(id.clone()),
                name: entry.name.clone(),
                base_url: entry.base_url.clone(),
                credentials: entry.auth.clone(),
            })
            .collect()
    }

    /// Mirror connection, or `None` when pushing is disabled.
    ///
    /// # Errors
    ///
    /// Fails when the mirror is enabled without a base URL.
    pub fn mirror_settings(&self) -> anyhow::Result<Option<MirrorSettings>> {
        let mirror = &self.mirror;
        if !mirror.enabled {
            return Ok(None);
        }
        if mirror.base_url.trim().is_empty() {
            bail!("[mirror] is enabled but base_url is empty");
        }

        let mut settings = MirrorSettings::new(&mirror.base_url, &mirror.api_key, &mirror.token);
        if let Some(table) = non_empty(mirror.events_table.as_deref()) {
            settings.events_table = table;
        }
        if let Some(table) = non_empty(mirror.shipments_table.as_deref()) {
            settings.shipments_table = table;
        }
        Ok(Some(settings))
    }
}

fn non_empty(configured: Option<&str>) -> Option<String> {
    configured
        .map(str::trim)
        .filter(|table| !table.is_empty())
        .map(str::to_owned)
}
