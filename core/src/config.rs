//! Persisted preferences: grouping state and polling settings.
//!
//! Stores configuration in JSON format at `~/.gravitywatch/config.json`.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use crate::domain::{GroupingConfig, MappingCorrection};
use crate::error::{Error, Result};
use crate::hunter::DEFAULT_SCAN_ATTEMPTS;
use crate::reactor::DEFAULT_RESCAN_ATTEMPTS;

/// Configuration data stored in JSON format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default, rename = "groupingEnabled")]
    pub grouping_enabled: bool,

    /// modelId -> groupId.
    #[serde(default, rename = "groupMappings")]
    pub group_mappings: BTreeMap<String, String>,

    /// modelId -> custom name of the group containing it.
    #[serde(default, rename = "groupNames")]
    pub group_names: BTreeMap<String, String>,

    /// Poll interval in seconds.
    #[serde(default = "default_refresh_interval", rename = "refreshInterval")]
    pub refresh_interval: u64,

    #[serde(default = "default_scan_attempts", rename = "scanAttempts")]
    pub scan_attempts: u32,

    #[serde(default = "default_rescan_attempts", rename = "rescanAttempts")]
    pub rescan_attempts: u32,
}

fn default_refresh_interval() -> u64 {
    120
}

fn default_scan_attempts() -> u32 {
    DEFAULT_SCAN_ATTEMPTS
}

fn default_rescan_attempts() -> u32 {
    DEFAULT_RESCAN_ATTEMPTS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            grouping_enabled: false,
            group_mappings: BTreeMap::new(),
            group_names: BTreeMap::new(),
            refresh_interval: default_refresh_interval(),
            scan_attempts: default_scan_attempts(),
            rescan_attempts: default_rescan_attempts(),
        }
    }
}

impl Config {
    /// The grouping inputs the decoder reads.
    pub fn grouping(&self) -> GroupingConfig {
        GroupingConfig {
            enabled: self.grouping_enabled,
            mappings: self.group_mappings.clone().into_iter().collect(),
            custom_names: self.group_names.clone().into_iter().collect(),
        }
    }
}

/// Configuration store for grouping preferences and settings.
///
/// Every read-modify-write goes through [`ConfigStore::update`], so a
/// background correction cannot overwrite a concurrent user change.
pub struct ConfigStore {
    config_path: PathBuf,
    write_lock: Mutex<()>,
}

impl ConfigStore {
    /// Create a config store at `~/.gravitywatch/config.json`.
    pub fn new() -> Result<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| Error::Config("Could not determine home directory".to_string()))?;

        Ok(Self::with_path(home.join(".gravitywatch").join("config.json")))
    }

    /// Create a config store with a custom path (for testing).
    pub fn with_path(config_path: PathBuf) -> Self {
        Self {
            config_path,
            write_lock: Mutex::new(()),
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load configuration from disk; a missing file yields defaults.
    pub async fn load(&self) -> Result<Config> {
        let content = match fs::read_to_string(&self.config_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Config::default()),
            Err(e) => return Err(config_error("read", e)),
        };
        serde_json::from_str(&content).map_err(|e| config_error("parse", e))
    }

    /// Replace the stored configuration.
    pub async fn save(&self, config: &Config) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.write(config).await
    }

    /// Load, let `edit` change the config and save it if `edit` reports a change.
    async fn update<F>(&self, edit: F) -> Result<bool>
    where
        F: FnOnce(&mut Config) -> bool,
    {
        let _guard = self.write_lock.lock().await;
        let mut config = self.load().await?;
        let changed = edit(&mut config);
        if changed {
            self.write(&config).await?;
        }
        Ok(changed)
    }

    /// Write through a sibling temp file so readers never see a partial file.
    async fn write(&self, config: &Config) -> Result<()> {
        let content = serde_json::to_vec_pretty(config).map_err(|e| config_error("serialize", e))?;
        if let Some(dir) = self.config_path.parent() {
            fs::create_dir_all(dir).await.map_err(|e| config_error("create directory for", e))?;
        }

        let staged = self.config_path.with_extension("json.tmp");
        let mut file = fs::File::create(&staged).await.map_err(|e| config_error("stage", e))?;
        file.write_all(&content).await.map_err(|e| config_error("write", e))?;
        file.sync_all().await.map_err(|e| config_error("flush", e))?;
        drop(file);
        fs::rename(&staged, &self.config_path)
            .await
            .map_err(|e| config_error("replace", e))?;

        debug!(path = %self.config_path.display(), "Config written");
        Ok(())
    }

    pub async fn grouping_config(&self) -> Result<GroupingConfig> {
        Ok(self.load().await?.grouping())
    }

    // =========================================================================
    // Grouping
    // =========================================================================

    pub async fn get_grouping_enabled(&self) -> Result<bool> {
        Ok(self.load().await?.grouping_enabled)
    }

    pub async fn set_grouping_enabled(&self, enabled: bool) -> Result<()> {
        self.update(|config| {
            config.grouping_enabled = enabled;
            true
        })
        .await?;
        Ok(())
    }

    pub async fn get_group_mappings(&self) -> Result<HashMap<String, String>> {
        Ok(self.load().await?.group_mappings.into_iter().collect())
    }

    /// Replace the whole mapping.
    pub async fn set_group_mappings(&self, mappings: &HashMap<String, String>) -> Result<()> {
        self.update(|config| {
            config.group_mappings = mappings
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            true
        })
        .await?;
        Ok(())
    }

    /// Persist drift corrections. Returns whether the file changed.
    pub async fn apply_corrections(&self, corrections: &[MappingCorrection]) -> Result<bool> {
        self.update(|config| {
            let mut changed = false;
            for correction in corrections {
                match correction {
                    MappingCorrection::Evict {
                        model_id,
                        from_group,
                    } => {
                        if config.group_mappings.get(model_id) == Some(from_group) {
                            config.group_mappings.remove(model_id);
                            changed = true;
                        }
                    }
                }
            }
            changed
        })
        .await
    }

    /// Name the group formed by `model_ids`.
    pub async fn set_group_name(&self, model_ids: &[String], name: &str) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::Config("Group name cannot be empty".to_string()));
        }
        self.update(|config| {
            for id in model_ids {
                config.group_names.insert(id.clone(), name.to_string());
            }
            true
        })
        .await?;
        Ok(())
    }

    pub async fn clear_group_name(&self, model_ids: &[String]) -> Result<()> {
        self.update(|config| {
            model_ids
                .iter()
                .fold(false, |changed, id| config.group_names.remove(id).is_some() || changed)
        })
        .await?;
        Ok(())
    }

    // =========================================================================
    // Settings
    // =========================================================================

    /// Get the refresh interval in seconds.
    pub async fn get_refresh_interval(&self) -> Result<u64> {
        Ok(self.load().await?.refresh_interval)
    }

    /// Set the refresh interval in seconds.
    pub async fn set_refresh_interval(&self, interval: u64) -> Result<()> {
        if interval == 0 {
            return Err(Error::Config("Refresh interval must be positive".to_string()));
        }
        self.update(|config| {
            config.refresh_interval = interval;
            true
        })
        .await?;
        Ok(())
    }
}

const CONFIG_FILE: &str = "config.json";

fn config_error(action: &str, err: impl std::fmt::Display) -> Error {
    Error::Config(format!("Cannot {} {}: {}", action, CONFIG_FILE, err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_store() -> (ConfigStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        (ConfigStore::with_path(path), dir)
    }

    #[tokio::test]
    async fn test_load_nonexistent() {
        let (store, _dir) = test_store();
        let config = store.load().await.unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.refresh_interval, 120);
        assert_eq!(config.scan_attempts, 3);
        assert_eq!(config.rescan_attempts, 5);
    }

    #[tokio::test]
    async fn test_partial_file_uses_defaults() {
        let (store, _dir) = test_store();
        fs::create_dir_all(store.config_path().parent().unwrap()).await.unwrap();
        fs::write(store.config_path(), r#"{ "groupingEnabled": true }"#)
            .await
            .unwrap();

        let config = store.load().await.unwrap();
        assert!(config.grouping_enabled);
        assert_eq!(config.refresh_interval, 120);
    }

    #[tokio::test]
    async fn test_save_is_atomic_and_camel_case() {
        let (store, _dir) = test_store();
        store.set_grouping_enabled(true).await.unwrap();

        assert!(!store.config_path().with_extension("json.tmp").exists());
        let raw = fs::read_to_string(store.config_path()).await.unwrap();
        assert!(raw.contains("\"groupingEnabled\": true"));
        assert!(raw.contains("\"refreshInterval\""));
    }

    #[tokio::test]
    async fn test_mappings_and_corrections() {
        let (store, _dir) = test_store();
        let mappings: HashMap<String, String> = [("a", "g"), ("b", "g"), ("c", "g")]
            .into_iter()
            .map(|(m, g)| (m.to_string(), g.to_string()))
            .collect();
        store.set_group_mappings(&mappings).await.unwrap();

        let changed = store
            .apply_corrections(&[MappingCorrection::Evict {
                model_id: "c".into(),
                from_group: "g".into(),
            }])
            .await
            .unwrap();
        assert!(changed);

        let stored = store.get_group_mappings().await.unwrap();
        assert_eq!(stored.len(), 2);
        assert!(!stored.contains_key("c"));

        // Already applied
        let again = store
            .apply_corrections(&[MappingCorrection::Evict {
                model_id: "c".into(),
                from_group: "g".into(),
            }])
            .await
            .unwrap();
        assert!(!again);
    }

    #[tokio::test]
    async fn test_group_names() {
        let (store, _dir) = test_store();
        let members = vec!["a".to_string(), "b".to_string()];

        store.set_group_name(&members, "  Pro Pool ").await.unwrap();
        let grouping = store.grouping_config().await.unwrap();
        assert_eq!(grouping.custom_names.get("a").map(String::as_str), Some("Pro Pool"));
        assert_eq!(grouping.custom_names.get("b").map(String::as_str), Some("Pro Pool"));

        assert!(store.set_group_name(&members, "   ").await.is_err());

        store.clear_group_name(&members).await.unwrap();
        assert!(store.grouping_config().await.unwrap().custom_names.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_updates_are_not_lost() {
        let (store, _dir) = test_store();
        let mappings: HashMap<String, String> = [("a".to_string(), "g".to_string())].into();
        store.set_group_mappings(&mappings).await.unwrap();

        let members = vec!["a".to_string()];
        let corrections = [MappingCorrection::Evict {
            model_id: "a".into(),
            from_group: "g".into(),
        }];
        let (named, enabled, corrected) = tokio::join!(
            store.set_group_name(&members, "Mine"),
            store.set_grouping_enabled(true),
            store.apply_corrections(&corrections),
        );
        named.unwrap();
        enabled.unwrap();
        assert!(corrected.unwrap());

        let config = store.load().await.unwrap();
        assert!(config.grouping_enabled);
        assert_eq!(config.group_names.get("a").map(String::as_str), Some("Mine"));
        assert!(config.group_mappings.is_empty());
    }

    #[tokio::test]
    async fn test_refresh_interval() {
        let (store, _dir) = test_store();
        store.set_refresh_interval(30).await.unwrap();
        assert_eq!(store.get_refresh_interval().await.unwrap(), 30);
        assert!(store.set_refresh_interval(0).await.is_err());
    }
}
