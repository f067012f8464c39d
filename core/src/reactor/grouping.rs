//! Quota grouping by fingerprint consensus.
//!
//! Models that report the same remaining fraction and reset time draw from
//! one pool. A persisted `modelId -> groupId` mapping fixes membership
//! between polls; every decode re-checks it and evicts members whose quota
//! no longer matches their group's majority.

use std::collections::HashMap;

use crate::domain::{
    group_id_for, GroupingConfig, MappingCorrection, ModelQuotaInfo, QuotaFingerprint, QuotaGroup,
};

/// Bucket for models that match no known family.
pub const OTHER_FAMILY: &str = "Other";

/// Known model constants by family, used when fingerprints carry no signal.
const FAMILY_TABLE: &[(&str, &[&str])] = &[
    (
        "Claude",
        &[
            "MODEL_CLAUDE_4_5_SONNET",
            "MODEL_CLAUDE_4_5_SONNET_THINKING",
            "MODEL_PLACEHOLDER_M12",
            "MODEL_OPENAI_GPT_OSS_120B_MEDIUM",
        ],
    ),
    ("Gemini Pro", &["MODEL_PLACEHOLDER_M7", "MODEL_PLACEHOLDER_M8"]),
    ("Gemini Flash", &["MODEL_PLACEHOLDER_M18"]),
];

/// Family of a model constant, or [`OTHER_FAMILY`].
pub fn family_of(model_id: &str) -> &'static str {
    FAMILY_TABLE
        .iter()
        .find(|(_, members)| members.contains(&model_id))
        .map(|(family, _)| *family)
        .unwrap_or(OTHER_FAMILY)
}

/// Groups for one decode plus the mapping drift they revealed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupingOutcome {
    pub groups: Vec<QuotaGroup>,
    pub corrections: Vec<MappingCorrection>,
}

/// Models sharing a key, by index into the sorted model list.
struct Bucket {
    key: String,
    members: Vec<usize>,
}

/// Insertion-ordered buckets.
#[derive(Default)]
struct Buckets {
    order: Vec<Bucket>,
    index: HashMap<String, usize>,
}

impl Buckets {
    fn add(&mut self, key: &str, member: usize) {
        match self.index.get(key) {
            Some(&i) => self.order[i].members.push(member),
            None => {
                self.index.insert(key.to_string(), self.order.len());
                self.order.push(Bucket {
                    key: key.to_string(),
                    members: vec![member],
                });
            }
        }
    }
}

/// The value with the most votes; ties go to the first one encountered.
fn majority<T: PartialEq + Clone>(votes: impl IntoIterator<Item = T>) -> Option<T> {
    let mut tally: Vec<(T, usize)> = Vec::new();
    for vote in votes {
        match tally.iter_mut().find(|(v, _)| *v == vote) {
            Some((_, count)) => *count += 1,
            None => tally.push((vote, 1)),
        }
    }

    let mut best: Option<(T, usize)> = None;
    for (value, count) in tally {
        if best.as_ref().map_or(true, |(_, c)| count > *c) {
            best = Some((value, count));
        }
    }
    best.map(|(value, _)| value)
}

/// Group `models` (already in display order) under `config`.
pub fn build_groups(models: &[ModelQuotaInfo], config: &GroupingConfig) -> GroupingOutcome {
    let mut buckets = Buckets::default();
    for (i, model) in models.iter().enumerate() {
        let key = if config.mappings.is_empty() {
            model.model_id.as_str()
        } else {
            config
                .mappings
                .get(&model.model_id)
                .map(String::as_str)
                .unwrap_or(model.model_id.as_str())
        };
        buckets.add(key, i);
    }

    let (kept, corrections) = evict_outliers(models, config, buckets.order);
    let groups = assemble(models, config, kept);
    GroupingOutcome {
        groups,
        corrections,
    }
}

/// Split off members whose fingerprint differs from their bucket's majority.
fn evict_outliers(
    models: &[ModelQuotaInfo],
    config: &GroupingConfig,
    buckets: Vec<Bucket>,
) -> (Vec<Vec<usize>>, Vec<MappingCorrection>) {
    let mut kept = Vec::with_capacity(buckets.len());
    let mut evicted = Vec::new();
    let mut corrections = Vec::new();

    for bucket in buckets {
        if bucket.members.len() < 2 {
            kept.push(bucket.members);
            continue;
        }

        let fingerprints: Vec<QuotaFingerprint> =
            bucket.members.iter().map(|&i| models[i].fingerprint()).collect();
        let Some(consensus) = majority(fingerprints.iter().cloned()) else {
            kept.push(bucket.members);
            continue;
        };

        let mut stay = Vec::new();
        for (&i, fingerprint) in bucket.members.iter().zip(&fingerprints) {
            if *fingerprint == consensus {
                stay.push(i);
                continue;
            }
            let model_id = &models[i].model_id;
            if config.mappings.get(model_id) == Some(&bucket.key) {
                corrections.push(MappingCorrection::Evict {
                    model_id: model_id.clone(),
                    from_group: bucket.key.clone(),
                });
            }
            evicted.push(vec![i]);
        }
        kept.push(stay);
    }

    kept.extend(evicted);
    (kept, corrections)
}

/// Order by first member, then name each group.
fn assemble(
    models: &[ModelQuotaInfo],
    config: &GroupingConfig,
    mut member_sets: Vec<Vec<usize>>,
) -> Vec<QuotaGroup> {
    member_sets.retain(|members| !members.is_empty());
    for members in &mut member_sets {
        members.sort_unstable();
    }
    member_sets.sort_by_key(|members| members[0]);

    member_sets
        .into_iter()
        .enumerate()
        .filter_map(|(position, members)| {
            let members: Vec<ModelQuotaInfo> = members.iter().map(|&i| models[i].clone()).collect();
            let group_id = group_id_for(members.iter().map(|m| m.model_id.as_str()));
            let group_name = resolve_name(&members, config, position);
            QuotaGroup::new(group_id, group_name, members)
        })
        .collect()
}

/// Anchor consensus over the members' custom names.
fn resolve_name(members: &[ModelQuotaInfo], config: &GroupingConfig, position: usize) -> String {
    let custom = members
        .iter()
        .filter_map(|m| config.custom_names.get(&m.model_id).cloned());
    if let Some(name) = majority(custom) {
        return name;
    }
    match members {
        [only] => only.label.clone(),
        _ => format!("Group {}", position + 1),
    }
}

/// Fresh `modelId -> groupId` mapping from current fingerprints.
///
/// When every model shares one fingerprint (typically all full), the
/// fingerprints say nothing about pools and the family table is used instead.
pub fn calculate_group_mappings(models: &[ModelQuotaInfo]) -> HashMap<String, String> {
    let mut by_fingerprint: Vec<(QuotaFingerprint, Vec<&str>)> = Vec::new();
    for model in models {
        let fingerprint = model.fingerprint();
        match by_fingerprint.iter_mut().find(|(f, _)| *f == fingerprint) {
            Some((_, ids)) => ids.push(model.model_id.as_str()),
            None => by_fingerprint.push((fingerprint, vec![model.model_id.as_str()])),
        }
    }

    let partitions: Vec<Vec<&str>> = if by_fingerprint.len() == 1 && models.len() > 1 {
        let mut by_family: Vec<(&str, Vec<&str>)> = Vec::new();
        for model in models {
            let family = family_of(&model.model_id);
            match by_family.iter_mut().find(|(f, _)| *f == family) {
                Some((_, ids)) => ids.push(model.model_id.as_str()),
                None => by_family.push((family, vec![model.model_id.as_str()])),
            }
        }
        by_family.into_iter().map(|(_, ids)| ids).collect()
    } else {
        by_fingerprint.into_iter().map(|(_, ids)| ids).collect()
    };

    let mut mappings = HashMap::new();
    for ids in partitions {
        let group_id = group_id_for(ids.iter().copied());
        for id in ids {
            mappings.insert(id.to_string(), group_id.clone());
        }
    }
    mappings
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    const RESET_A: &str = "2026-10-18T00:00:00Z";
    const RESET_B: &str = "2026-10-19T00:00:00Z";

    fn model(id: &str, fraction: f64, reset: &str) -> ModelQuotaInfo {
        ModelQuotaInfo {
            label: format!("Label {}", id),
            model_id: id.to_string(),
            remaining_fraction: Some(fraction),
            remaining_percentage: Some(fraction * 100.0),
            is_exhausted: fraction == 0.0,
            reset_time_raw: reset.to_string(),
            reset_time: reset.parse::<DateTime<Utc>>().unwrap(),
            reset_time_display: String::new(),
            time_until_reset: 0,
            time_until_reset_formatted: String::new(),
            supports_images: false,
            is_recommended: false,
            tag_title: None,
            supported_mime_types: Vec::new(),
        }
    }

    fn mapped(pairs: &[(&str, &str)]) -> GroupingConfig {
        let mut config = GroupingConfig::enabled();
        for (model, group) in pairs {
            config.mappings.insert(model.to_string(), group.to_string());
        }
        config
    }

    fn ids(group: &QuotaGroup) -> Vec<&str> {
        group.model_ids().collect()
    }

    #[test]
    fn test_no_mapping_yields_singletons() {
        let models = vec![model("a", 0.5, RESET_A), model("b", 0.5, RESET_A)];
        let outcome = build_groups(&models, &GroupingConfig::enabled());

        assert_eq!(outcome.groups.len(), 2);
        assert_eq!(outcome.groups[0].group_id, "a");
        assert_eq!(outcome.groups[0].group_name, "Label a");
        assert!(outcome.corrections.is_empty());
    }

    #[test]
    fn test_majority_eviction() {
        let models = vec![
            model("a", 0.5, RESET_A),
            model("b", 0.5, RESET_A),
            model("c", 0.9, RESET_B),
        ];
        let config = mapped(&[("a", "g"), ("b", "g"), ("c", "g")]);
        let outcome = build_groups(&models, &config);

        assert_eq!(outcome.groups.len(), 2);
        assert_eq!(ids(&outcome.groups[0]), vec!["a", "b"]);
        assert_eq!(outcome.groups[0].group_id, "a|b");
        assert_eq!(ids(&outcome.groups[1]), vec!["c"]);
        assert_eq!(
            outcome.corrections,
            vec![MappingCorrection::Evict {
                model_id: "c".into(),
                from_group: "g".into()
            }]
        );

        let mut after = config.clone();
        after.apply(&outcome.corrections);
        assert!(!after.mappings.contains_key("c"));
        assert_eq!(after.mappings.get("a").map(String::as_str), Some("g"));
    }

    #[test]
    fn test_eviction_tie_keeps_first_fingerprint() {
        let models = vec![model("a", 0.5, RESET_A), model("b", 0.7, RESET_A)];
        let outcome = build_groups(&models, &mapped(&[("a", "g"), ("b", "g")]));

        assert_eq!(ids(&outcome.groups[0]), vec!["a"]);
        assert_eq!(ids(&outcome.groups[1]), vec!["b"]);
        assert_eq!(outcome.corrections.len(), 1);
    }

    #[test]
    fn test_unmapped_model_becomes_singleton() {
        let models = vec![
            model("a", 0.5, RESET_A),
            model("new", 0.5, RESET_A),
            model("b", 0.5, RESET_A),
        ];
        let outcome = build_groups(&models, &mapped(&[("a", "g"), ("b", "g")]));

        assert_eq!(outcome.groups.len(), 2);
        assert_eq!(ids(&outcome.groups[0]), vec!["a", "b"]);
        assert_eq!(ids(&outcome.groups[1]), vec!["new"]);
        assert!(outcome.corrections.is_empty());
    }

    #[test]
    fn test_groups_follow_model_order() {
        let models = vec![
            model("x", 0.1, RESET_A),
            model("a", 0.5, RESET_A),
            model("y", 0.1, RESET_A),
            model("b", 0.5, RESET_A),
        ];
        let config = mapped(&[("a", "g1"), ("b", "g1"), ("x", "g2"), ("y", "g2")]);
        let outcome = build_groups(&models, &config);

        assert_eq!(ids(&outcome.groups[0]), vec!["x", "y"]);
        assert_eq!(ids(&outcome.groups[1]), vec!["a", "b"]);
        assert_eq!(outcome.groups[0].group_name, "Group 1");
        assert_eq!(outcome.groups[1].group_name, "Group 2");
    }

    #[test]
    fn test_anchor_consensus_naming() {
        let models = vec![
            model("a", 0.5, RESET_A),
            model("b", 0.5, RESET_A),
            model("c", 0.5, RESET_A),
        ];
        let mut config = mapped(&[("a", "g"), ("b", "g"), ("c", "g")]);
        config.custom_names.insert("a".into(), "Old".into());
        config.custom_names.insert("b".into(), "Pro Pool".into());
        config.custom_names.insert("c".into(), "Pro Pool".into());

        let outcome = build_groups(&models, &config);
        assert_eq!(outcome.groups[0].group_name, "Pro Pool");
    }

    #[test]
    fn test_calculate_mappings_distinct_fingerprints() {
        let models = vec![
            model("a", 0.1, RESET_A),
            model("b", 0.2, RESET_A),
            model("c", 0.2, RESET_B),
        ];
        let mappings = calculate_group_mappings(&models);

        assert_eq!(mappings.len(), 3);
        assert_eq!(mappings["a"], "a");
        assert_eq!(mappings["b"], "b");
        assert_eq!(mappings["c"], "c");
    }

    #[test]
    fn test_calculate_mappings_shared_fingerprint_pairs() {
        let models = vec![
            model("a", 0.4, RESET_A),
            model("b", 0.4, RESET_A),
            model("c", 0.8, RESET_A),
        ];
        let mappings = calculate_group_mappings(&models);
        assert_eq!(mappings["a"], "a|b");
        assert_eq!(mappings["b"], "a|b");
        assert_eq!(mappings["c"], "c");
    }

    #[test]
    fn test_calculate_mappings_degenerate_uses_families() {
        let models = vec![
            model("MODEL_CLAUDE_4_5_SONNET", 1.0, RESET_A),
            model("MODEL_PLACEHOLDER_M7", 1.0, RESET_A),
            model("MODEL_CLAUDE_4_5_SONNET_THINKING", 1.0, RESET_A),
            model("MODEL_PLACEHOLDER_M8", 1.0, RESET_A),
            model("MODEL_PLACEHOLDER_M18", 1.0, RESET_A),
            model("MODEL_SOMETHING_NEW", 1.0, RESET_A),
        ];
        let mappings = calculate_group_mappings(&models);

        let claude = "MODEL_CLAUDE_4_5_SONNET|MODEL_CLAUDE_4_5_SONNET_THINKING";
        assert_eq!(mappings["MODEL_CLAUDE_4_5_SONNET"], claude);
        assert_eq!(mappings["MODEL_CLAUDE_4_5_SONNET_THINKING"], claude);
        assert_eq!(
            mappings["MODEL_PLACEHOLDER_M7"],
            "MODEL_PLACEHOLDER_M7|MODEL_PLACEHOLDER_M8"
        );
        assert_eq!(mappings["MODEL_PLACEHOLDER_M18"], "MODEL_PLACEHOLDER_M18");
        assert_eq!(mappings["MODEL_SOMETHING_NEW"], "MODEL_SOMETHING_NEW");

        let distinct: std::collections::HashSet<&String> = mappings.values().collect();
        assert_eq!(distinct.len(), 4);
    }

    #[test]
    fn test_single_model_is_not_degenerate() {
        let models = vec![model("MODEL_CLAUDE_4_5_SONNET", 1.0, RESET_A)];
        let mappings = calculate_group_mappings(&models);
        assert_eq!(mappings["MODEL_CLAUDE_4_5_SONNET"], "MODEL_CLAUDE_4_5_SONNET");
    }

    #[test]
    fn test_family_lookup() {
        assert_eq!(family_of("MODEL_OPENAI_GPT_OSS_120B_MEDIUM"), "Claude");
        assert_eq!(family_of("MODEL_PLACEHOLDER_M18"), "Gemini Flash");
        assert_eq!(family_of("unknown"), OTHER_FAMILY);
    }
}
