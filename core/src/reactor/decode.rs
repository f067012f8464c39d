//! Status response decoding.

use chrono::{DateTime, Local, Utc};
use serde_json::Value;
use tracing::warn;

use crate::domain::{
    format_delta, GroupingConfig, MappingCorrection, ModelQuotaInfo, PromptCredits, QuotaSnapshot,
    UserInfo,
};
use crate::error::{Error, Result};

use super::grouping::build_groups;
use super::wire::{ClientModelConfig, QuotaInfo, UserStatus, UserStatusResponse};

/// A decoded snapshot and the mapping corrections found while grouping.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeOutcome {
    pub snapshot: QuotaSnapshot,
    pub corrections: Vec<MappingCorrection>,
}

/// Turn a raw status response into a snapshot as of `now`.
///
/// Pure: the caller decides what to do with the returned corrections.
pub fn decode_signal(raw: &Value, config: &GroupingConfig, now: DateTime<Utc>) -> Result<DecodeOutcome> {
    let response: UserStatusResponse = serde_json::from_value(raw.clone())
        .map_err(|e| Error::MalformedResponse(e.to_string()))?;

    let status = match response.user_status {
        Some(status) => status,
        None => {
            return Err(match response.message.filter(|m| !m.trim().is_empty()) {
                Some(message) => Error::ServerReported(message),
                None => Error::MalformedResponse("response has no userStatus".to_string()),
            });
        }
    };

    let models = decode_models(&status, now);

    let (groups, corrections) = if config.enabled {
        let outcome = build_groups(&models, config);
        (Some(outcome.groups), outcome.corrections)
    } else {
        (None, Vec::new())
    };

    let snapshot = QuotaSnapshot {
        timestamp: now,
        user_info: Some(user_info(&status)),
        prompt_credits: prompt_credits(&status),
        models,
        groups,
        is_connected: true,
        error_message: None,
    };

    Ok(DecodeOutcome {
        snapshot,
        corrections,
    })
}

/// Models with quota, sorted by the recommended order then label.
fn decode_models(status: &UserStatus, now: DateTime<Utc>) -> Vec<ModelQuotaInfo> {
    let Some(data) = &status.cascade_model_config_data else {
        return Vec::new();
    };

    let mut models: Vec<ModelQuotaInfo> = data
        .client_model_configs
        .iter()
        .filter_map(|config| {
            let quota = config.quota_info.as_ref()?;
            Some(model_info(config, quota, now))
        })
        .collect();

    let order = data.recommended_order();
    let rank = |label: &str| order.iter().position(|l| l == label).unwrap_or(usize::MAX);
    models.sort_by(|a, b| {
        rank(&a.label)
            .cmp(&rank(&b.label))
            .then_with(|| a.label.cmp(&b.label))
    });
    models
}

fn model_info(config: &ClientModelConfig, quota: &QuotaInfo, now: DateTime<Utc>) -> ModelQuotaInfo {
    let reset_time_raw = quota.reset_time.clone().unwrap_or_default();
    let reset_time = match DateTime::parse_from_rfc3339(&reset_time_raw) {
        Ok(parsed) => parsed.with_timezone(&Utc),
        Err(e) => {
            if !reset_time_raw.is_empty() {
                warn!(label = %config.label, raw = %reset_time_raw, error = %e, "Unparsable reset time");
            }
            now
        }
    };
    let time_until_reset = (reset_time - now).num_milliseconds();
    // Zero-valued fields are omitted on the wire.
    let remaining_fraction = quota.remaining_fraction.unwrap_or(0.0);

    ModelQuotaInfo {
        label: config.label.clone(),
        model_id: config.model_id(),
        remaining_fraction: Some(remaining_fraction),
        remaining_percentage: Some(remaining_fraction * 100.0),
        is_exhausted: remaining_fraction == 0.0,
        reset_time_display: reset_time
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M")
            .to_string(),
        reset_time_raw,
        reset_time,
        time_until_reset,
        time_until_reset_formatted: format_delta(time_until_reset),
        supports_images: config.supports_images,
        is_recommended: config.is_recommended,
        tag_title: config.tag_title.clone(),
        supported_mime_types: config.mime_types(),
    }
}

fn user_info(status: &UserStatus) -> UserInfo {
    UserInfo {
        name: status.name.clone(),
        email: status.email.clone(),
        plan_name: status
            .plan_status
            .as_ref()
            .and_then(|p| p.plan_info.as_ref())
            .and_then(|i| i.plan_name.clone()),
        tier: status.user_tier.as_ref().and_then(|t| t.name.clone()),
    }
}

fn prompt_credits(status: &UserStatus) -> Option<PromptCredits> {
    let plan = status.plan_status.as_ref()?;
    let available = plan.available_prompt_credits?;
    let monthly = plan.plan_info.as_ref()?.monthly_prompt_credits?;
    Some(PromptCredits::new(available, monthly))
}
