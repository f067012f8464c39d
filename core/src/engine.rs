//! GravityWatch Engine - composition root.
//!
//! Builds the platform strategy, adapters, `ProcessHunter`, `ReactorCore`
//! and `ConfigStore` once and wires them together: the reactor re-scans
//! through the hunter and persists grouping corrections through the store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::adapters::{HttpsTransport, LogReporter, TokioCommandRunner};
use crate::config::{Config, ConfigStore};
use crate::domain::{EnvironmentScanResult, MappingCorrection, QuotaSnapshot};
use crate::error::{Error, Result};
use crate::hunter::ProcessHunter;
use crate::platform::PlatformStrategy;
use crate::reactor::{calculate_group_mappings, ReactorCore};

pub type Hunter = ProcessHunter<TokioCommandRunner, HttpsTransport>;
pub type Reactor = ReactorCore<HttpsTransport>;

/// The wired discovery and telemetry services.
pub struct Engine {
    config: Arc<ConfigStore>,
    hunter: Arc<Hunter>,
    reactor: Arc<Reactor>,
    /// Corrections published by the reactor and not yet written to the store.
    pending_corrections: Arc<Mutex<Vec<MappingCorrection>>>,
    hooks_installed: AtomicBool,
}

impl Engine {
    /// Create an engine for the running platform with the default config path.
    pub fn new() -> Result<Self> {
        Self::with_config(ConfigStore::new()?)
    }

    pub fn with_config(config: ConfigStore) -> Result<Self> {
        let strategy = PlatformStrategy::detect()?;
        let transport = HttpsTransport::new()?;

        let hunter = ProcessHunter::new(strategy, TokioCommandRunner::new(), transport.clone());
        let reactor = ReactorCore::new(transport, Arc::new(LogReporter::new()));

        let engine = Self {
            config: Arc::new(config),
            hunter: Arc::new(hunter),
            reactor: Arc::new(reactor),
            pending_corrections: Arc::new(Mutex::new(Vec::new())),
            hooks_installed: AtomicBool::new(false),
        };
        engine.install_correction_persister();
        Ok(engine)
    }

    pub fn hunter(&self) -> &Hunter {
        &self.hunter
    }

    pub fn reactor(&self) -> &Arc<Reactor> {
        &self.reactor
    }

    pub fn config(&self) -> &ConfigStore {
        &self.config
    }

    /// Run discovery only.
    pub async fn scan(&self) -> Result<EnvironmentScanResult> {
        let config = self.config.load().await?;
        self.hunter
            .scan_environment(config.scan_attempts)
            .await
            .ok_or_else(|| self.hunter.scan_failure())
    }

    /// Discover the server and engage the reactor without polling.
    pub async fn connect(&self) -> Result<Config> {
        let config = self.config.load().await?;
        let found = self
            .hunter
            .scan_environment(config.scan_attempts)
            .await
            .ok_or_else(|| self.hunter.scan_failure())?;

        self.reactor.engage(
            found.connect_port,
            found.csrf_token,
            Some(self.hunter.last_diagnostics()),
        );
        self.reactor.set_grouping_config(config.grouping());
        self.reactor.set_rescan_limit(config.rescan_attempts);
        self.install_hooks(config.scan_attempts);

        Ok(config)
    }

    /// Connect, then start polling every `interval`, or at the configured
    /// refresh interval when `None`.
    ///
    /// Returns whether the initial sync succeeded.
    pub async fn launch(&self, interval: Option<Duration>) -> Result<bool> {
        let config = self.connect().await?;
        let interval = interval.unwrap_or(Duration::from_secs(config.refresh_interval));
        Ok(self.reactor.start_reactor(interval).await)
    }

    /// Connect and fetch a single snapshot.
    pub async fn status(&self) -> Result<QuotaSnapshot> {
        self.connect().await?;
        let snapshot = self.reactor.fetch_snapshot().await;
        self.flush_corrections().await;
        snapshot
    }

    fn install_hooks(&self, scan_attempts: u32) {
        if self.hooks_installed.swap(true, Ordering::AcqRel) {
            return;
        }

        let hunter = Arc::clone(&self.hunter);
        self.reactor.set_rescan_hook(move || {
            let hunter = Arc::clone(&hunter);
            async move { hunter.scan_environment(scan_attempts).await }
        });
    }

    /// Queue corrections for the store and write them in the background.
    /// One-shot operations also flush the queue before returning.
    fn install_correction_persister(&self) {
        let store = Arc::clone(&self.config);
        let pending = Arc::clone(&self.pending_corrections);
        self.reactor.on_corrections(move |corrections| {
            pending.lock().extend_from_slice(corrections);
            let store = Arc::clone(&store);
            let pending = Arc::clone(&pending);
            if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                runtime.spawn(async move { persist_corrections(&store, &pending).await });
            }
        });
    }

    /// Write any queued corrections to the store.
    pub async fn flush_corrections(&self) {
        persist_corrections(&self.config, &self.pending_corrections).await;
    }

    // =========================================================================
    // Grouping
    // =========================================================================

    /// Compute a fresh mapping from the latest snapshot, persist it and
    /// enable grouping.
    pub async fn auto_group(&self) -> Result<HashMap<String, String>> {
        let snapshot = self
            .reactor
            .latest_snapshot()
            .ok_or_else(|| Error::Config("No telemetry received yet".to_string()))?;

        let mappings = calculate_group_mappings(&snapshot.models);
        self.config.set_group_mappings(&mappings).await?;
        self.config.set_grouping_enabled(true).await?;
        info!(models = mappings.len(), "Auto-grouped models");

        self.refresh_grouping().await?;
        Ok(mappings)
    }

    /// Persist the grouping toggle. The first enable seeds a mapping.
    pub async fn set_grouping_enabled(&self, enabled: bool) -> Result<Option<QuotaSnapshot>> {
        self.config.set_grouping_enabled(enabled).await?;

        if enabled && self.config.get_group_mappings().await?.is_empty() {
            if let Some(snapshot) = self.reactor.latest_snapshot() {
                let mappings = calculate_group_mappings(&snapshot.models);
                self.config.set_group_mappings(&mappings).await?;
            }
        }

        self.refresh_grouping().await
    }

    /// Name the group currently containing `model_id`.
    pub async fn rename_group(&self, model_id: &str, name: &str) -> Result<Option<QuotaSnapshot>> {
        let members = self.group_members(model_id);
        self.config.set_group_name(&members, name).await?;
        self.refresh_grouping().await
    }

    /// Model ids sharing a group with `model_id` in the latest snapshot.
    fn group_members(&self, model_id: &str) -> Vec<String> {
        self.reactor
            .latest_snapshot()
            .and_then(|snapshot| snapshot.groups)
            .and_then(|groups| {
                groups
                    .into_iter()
                    .find(|g| g.model_ids().any(|id| id == model_id))
            })
            .map(|group| group.model_ids().map(str::to_string).collect())
            .unwrap_or_else(|| vec![model_id.to_string()])
    }

    /// Push persisted grouping into the reactor and re-decode.
    async fn refresh_grouping(&self) -> Result<Option<QuotaSnapshot>> {
        let grouping = self.config.grouping_config().await?;
        self.reactor.set_grouping_config(grouping);
        let snapshot = self.reactor.reprocess();
        self.flush_corrections().await;
        Ok(snapshot)
    }

    pub fn shutdown(&self) {
        self.reactor.shutdown();
    }
}

async fn persist_corrections(store: &ConfigStore, pending: &Mutex<Vec<MappingCorrection>>) {
    let batch = std::mem::take(&mut *pending.lock());
    if batch.is_empty() {
        return;
    }
    match store.apply_corrections(&batch).await {
        Ok(changed) => info!(count = batch.len(), changed, "Group corrections persisted"),
        Err(e) => warn!(error = %e, "Failed to persist group corrections"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactor::fixtures::{status_response, FixtureModel};
    use tempfile::tempdir;

    fn engine() -> (Engine, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let store = ConfigStore::with_path(dir.path().join("config.json"));
        (Engine::with_config(store).unwrap(), dir)
    }

    #[tokio::test]
    async fn test_rename_without_snapshot_names_single_model() {
        let (engine, _dir) = engine();

        let snapshot = engine.rename_group("MODEL_A", "Mine").await.unwrap();
        assert!(snapshot.is_none());

        let grouping = engine.config().grouping_config().await.unwrap();
        assert_eq!(grouping.custom_names.get("MODEL_A").map(String::as_str), Some("Mine"));
        assert_eq!(
            engine.reactor().grouping_config().custom_names.get("MODEL_A").map(String::as_str),
            Some("Mine")
        );
    }

    #[tokio::test]
    async fn test_toggle_grouping_reaches_reactor() {
        let (engine, _dir) = engine();

        engine.set_grouping_enabled(true).await.unwrap();
        assert!(engine.config().get_grouping_enabled().await.unwrap());
        assert!(engine.reactor().grouping_config().enabled);

        engine.set_grouping_enabled(false).await.unwrap();
        assert!(!engine.reactor().grouping_config().enabled);
    }

    #[tokio::test]
    async fn test_one_shot_regroup_persists_corrections() {
        let (engine, _dir) = engine();
        let mappings: HashMap<String, String> = ["MODEL_A", "MODEL_B", "MODEL_C"]
            .into_iter()
            .map(|id| (id.to_string(), "pool".to_string()))
            .collect();
        engine.config().set_group_mappings(&mappings).await.unwrap();
        engine.reactor().cache_raw_response(status_response(
            &[
                FixtureModel::new("A", "MODEL_A", Some(0.5), "2030-01-01T00:00:00Z"),
                FixtureModel::new("B", "MODEL_B", Some(0.5), "2030-01-01T00:00:00Z"),
                FixtureModel::new("C", "MODEL_C", Some(0.9), "2030-01-02T00:00:00Z"),
            ],
            &[],
        ));

        let snapshot = engine.set_grouping_enabled(true).await.unwrap().unwrap();
        assert_eq!(snapshot.groups.unwrap().len(), 2);

        // Written before the call returned, not by a background task
        let raw = tokio::fs::read_to_string(engine.config().config_path()).await.unwrap();
        let stored: Config = serde_json::from_str(&raw).unwrap();
        assert!(!stored.group_mappings.contains_key("MODEL_C"));
        assert_eq!(stored.group_mappings.get("MODEL_A").map(String::as_str), Some("pool"));
        assert!(engine.pending_corrections.lock().is_empty());
    }

    #[tokio::test]
    async fn test_auto_group_needs_telemetry() {
        let (engine, _dir) = engine();
        assert!(matches!(engine.auto_group().await, Err(Error::Config(_))));
    }
}
