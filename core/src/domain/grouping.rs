//! Grouping preferences and the corrections the drift detector proposes.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Grouping inputs read by the decoder.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupingConfig {
    pub enabled: bool,
    /// modelId -> groupId. Empty means grouping was never set up.
    #[serde(default)]
    pub mappings: HashMap<String, String>,
    /// modelId -> custom display name of the group containing it.
    #[serde(default)]
    pub custom_names: HashMap<String, String>,
}

impl GroupingConfig {
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            ..Self::default()
        }
    }

    /// Apply drift corrections to the mapping.
    ///
    /// Returns true if anything changed.
    pub fn apply(&mut self, corrections: &[MappingCorrection]) -> bool {
        let mut changed = false;
        for correction in corrections {
            match correction {
                MappingCorrection::Evict {
                    model_id,
                    from_group,
                } => {
                    if self.mappings.get(model_id) == Some(from_group) {
                        self.mappings.remove(model_id);
                        changed = true;
                    }
                }
            }
        }
        changed
    }
}

/// A change to the persisted mapping detected during decode.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum MappingCorrection {
    /// The model no longer shares its group's quota and must leave it.
    #[serde(rename_all = "camelCase")]
    Evict { model_id: String, from_group: String },
}

impl std::fmt::Display for MappingCorrection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MappingCorrection::Evict {
                model_id,
                from_group,
            } => write!(f, "evict {} from {}", model_id, from_group),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_eviction_drops_mapping() {
        let mut config = GroupingConfig::enabled();
        config.mappings.insert("m1".into(), "g".into());
        config.mappings.insert("m2".into(), "g".into());

        let changed = config.apply(&[MappingCorrection::Evict {
            model_id: "m2".into(),
            from_group: "g".into(),
        }]);

        assert!(changed);
        assert_eq!(config.mappings.get("m1").map(String::as_str), Some("g"));
        assert!(!config.mappings.contains_key("m2"));
    }

    #[test]
    fn test_apply_ignores_stale_correction() {
        let mut config = GroupingConfig::enabled();
        config.mappings.insert("m2".into(), "other".into());

        let changed = config.apply(&[MappingCorrection::Evict {
            model_id: "m2".into(),
            from_group: "g".into(),
        }]);

        assert!(!changed);
        assert_eq!(config.mappings.get("m2").map(String::as_str), Some("other"));
    }
}
