//! Quota telemetry domain models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Shown instead of a countdown once a reset time has passed.
pub const ALREADY_RESET: &str = "Ready";

// ============================================================================
// ModelQuotaInfo
// ============================================================================

/// Remaining quota of a single model, derived from one status response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelQuotaInfo {
    pub label: String,
    pub model_id: String,
    /// Remaining budget in 0.0..=1.0.
    pub remaining_fraction: Option<f64>,
    pub remaining_percentage: Option<f64>,
    pub is_exhausted: bool,
    /// Reset time exactly as the server sent it.
    pub reset_time_raw: String,
    pub reset_time: DateTime<Utc>,
    /// Local wall-clock rendering of `reset_time`.
    pub reset_time_display: String,
    /// Milliseconds until reset, negative once passed.
    pub time_until_reset: i64,
    pub time_until_reset_formatted: String,
    pub supports_images: bool,
    pub is_recommended: bool,
    pub tag_title: Option<String>,
    pub supported_mime_types: Vec<String>,
}

impl ModelQuotaInfo {
    /// Quota identity used to decide whether two models share one pool.
    pub fn fingerprint(&self) -> QuotaFingerprint {
        QuotaFingerprint {
            micro_fraction: self.remaining_fraction.map(|f| (f * 1_000_000.0).round() as i64),
            reset_time: self.reset_time_raw.clone(),
        }
    }
}

/// `(remaining fraction rounded to 6 decimals, reset time)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QuotaFingerprint {
    micro_fraction: Option<i64>,
    reset_time: String,
}

// ============================================================================
// QuotaGroup
// ============================================================================

/// Models that draw from the same quota pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaGroup {
    pub group_id: String,
    pub group_name: String,
    pub models: Vec<ModelQuotaInfo>,
    /// Minimum of the members' percentages.
    pub remaining_percentage: f64,
    pub reset_time: DateTime<Utc>,
    pub is_exhausted: bool,
}

impl QuotaGroup {
    /// Build a group, deriving the pessimistic summary from its members.
    ///
    /// Returns `None` for an empty member list.
    pub fn new(group_id: String, group_name: String, models: Vec<ModelQuotaInfo>) -> Option<Self> {
        let representative = models
            .iter()
            .min_by(|a, b| {
                let pa = a.remaining_percentage.unwrap_or(0.0);
                let pb = b.remaining_percentage.unwrap_or(0.0);
                pa.total_cmp(&pb)
            })?;

        let remaining_percentage = representative.remaining_percentage.unwrap_or(0.0);
        let reset_time = representative.reset_time;
        let is_exhausted = models.iter().any(|m| m.is_exhausted);

        Some(Self {
            group_id,
            group_name,
            models,
            remaining_percentage,
            reset_time,
            is_exhausted,
        })
    }

    pub fn model_ids(&self) -> impl Iterator<Item = &str> {
        self.models.iter().map(|m| m.model_id.as_str())
    }
}

/// Stable id of a group: its sorted member model ids joined with `|`.
///
/// A singleton's id is therefore its own model id.
pub fn group_id_for<'a>(model_ids: impl IntoIterator<Item = &'a str>) -> String {
    let mut ids: Vec<&str> = model_ids.into_iter().collect();
    ids.sort_unstable();
    ids.dedup();
    ids.join("|")
}

// ============================================================================
// QuotaSnapshot
// ============================================================================

/// Account details reported alongside quotas.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub name: Option<String>,
    pub email: Option<String>,
    pub plan_name: Option<String>,
    pub tier: Option<String>,
}

/// Prompt credit balance of the account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptCredits {
    pub available: f64,
    pub monthly: f64,
    pub used_percentage: f64,
    pub remaining_percentage: f64,
}

impl PromptCredits {
    pub fn new(available: f64, monthly: f64) -> Self {
        let remaining_percentage = if monthly > 0.0 {
            (available / monthly) * 100.0
        } else {
            0.0
        };
        Self {
            available,
            monthly,
            used_percentage: 100.0 - remaining_percentage,
            remaining_percentage,
        }
    }
}

/// Normalized result of decoding one status response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaSnapshot {
    pub timestamp: DateTime<Utc>,
    pub user_info: Option<UserInfo>,
    pub prompt_credits: Option<PromptCredits>,
    pub models: Vec<ModelQuotaInfo>,
    /// Present only when grouping is enabled.
    pub groups: Option<Vec<QuotaGroup>>,
    pub is_connected: bool,
    pub error_message: Option<String>,
}

// ============================================================================
// Countdown formatting
// ============================================================================

/// Format a reset countdown, tiered by magnitude.
///
/// Minutes round up, so 30 s reads as `1m`.
pub fn format_delta(ms: i64) -> String {
    if ms <= 0 {
        return ALREADY_RESET.to_string();
    }

    let total_minutes = (ms + 59_999) / 60_000;
    if total_minutes < 60 {
        return format!("{}m", total_minutes);
    }

    let total_hours = total_minutes / 60;
    let minutes = total_minutes % 60;
    if total_hours < 24 {
        return format!("{}h {}m", total_hours, minutes);
    }

    let days = total_hours / 24;
    let hours = total_hours % 24;
    format!("{}d {}h {}m", days, hours, minutes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(id: &str, fraction: Option<f64>, reset: &str) -> ModelQuotaInfo {
        let reset_time = reset.parse::<DateTime<Utc>>().unwrap();
        ModelQuotaInfo {
            label: id.to_string(),
            model_id: id.to_string(),
            remaining_fraction: fraction,
            remaining_percentage: fraction.map(|f| f * 100.0),
            is_exhausted: fraction == Some(0.0),
            reset_time_raw: reset.to_string(),
            reset_time,
            reset_time_display: String::new(),
            time_until_reset: 0,
            time_until_reset_formatted: String::new(),
            supports_images: false,
            is_recommended: false,
            tag_title: None,
            supported_mime_types: Vec::new(),
        }
    }

    #[test]
    fn test_format_delta_tiers() {
        assert_eq!(format_delta(30_000), "1m");
        assert_eq!(format_delta(59 * 60_000), "59m");
        assert_eq!(format_delta(61 * 60_000), "1h 1m");
        assert_eq!(format_delta(25 * 3_600_000), "1d 1h 0m");
        assert_eq!(format_delta(0), ALREADY_RESET);
        assert_eq!(format_delta(-5_000), ALREADY_RESET);
    }

    #[test]
    fn test_fingerprint_rounds_to_six_decimals() {
        let a = model("a", Some(0.3333331), "2026-01-01T00:00:00Z");
        let b = model("b", Some(0.33333312), "2026-01-01T00:00:00Z");
        let c = model("c", Some(0.333334), "2026-01-01T00:00:00Z");
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn test_group_takes_minimum_percentage() {
        let group = QuotaGroup::new(
            "a|b".to_string(),
            "Pair".to_string(),
            vec![
                model("a", Some(0.8), "2026-01-01T00:00:00Z"),
                model("b", Some(0.2), "2026-01-02T00:00:00Z"),
            ],
        )
        .unwrap();
        assert!((group.remaining_percentage - 20.0).abs() < 1e-9);
        assert_eq!(group.reset_time.to_rfc3339(), "2026-01-02T00:00:00+00:00");
        assert!(!group.is_exhausted);
    }

    #[test]
    fn test_empty_group_is_rejected() {
        assert!(QuotaGroup::new("x".into(), "X".into(), Vec::new()).is_none());
    }

    #[test]
    fn test_group_id_is_order_independent() {
        assert_eq!(group_id_for(["b", "a"]), "a|b");
        assert_eq!(group_id_for(["a", "b"]), "a|b");
        assert_eq!(group_id_for(["solo"]), "solo");
    }

    #[test]
    fn test_prompt_credits_percentages() {
        let credits = PromptCredits::new(250.0, 1000.0);
        assert!((credits.remaining_percentage - 25.0).abs() < 1e-9);
        assert!((credits.used_percentage - 75.0).abs() < 1e-9);
    }
}
