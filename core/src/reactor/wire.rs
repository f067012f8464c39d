//! Response shapes of the status endpoint.
//!
//! Every field is optional or defaulted: the server omits zero values and
//! adds fields freely, and a missing field must not fail the whole decode.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStatusResponse {
    pub user_status: Option<UserStatus>,
    /// Set instead of `user_status` when the server declines, e.g. signed out.
    pub message: Option<String>,
    pub code: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStatus {
    pub name: Option<String>,
    pub email: Option<String>,
    pub plan_status: Option<PlanStatus>,
    pub user_tier: Option<UserTier>,
    pub cascade_model_config_data: Option<CascadeModelConfigData>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanStatus {
    pub plan_info: Option<PlanInfo>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub available_prompt_credits: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanInfo {
    pub plan_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub monthly_prompt_credits: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserTier {
    pub id: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CascadeModelConfigData {
    #[serde(default)]
    pub client_model_configs: Vec<ClientModelConfig>,
    #[serde(default)]
    pub client_model_sorts: Vec<ClientModelSort>,
}

impl CascadeModelConfigData {
    /// Labels of the first sort, concatenated across its groups.
    pub fn recommended_order(&self) -> Vec<String> {
        self.client_model_sorts
            .first()
            .map(|sort| {
                sort.groups
                    .iter()
                    .flat_map(|g| g.model_labels.iter().cloned())
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientModelConfig {
    #[serde(default)]
    pub label: String,
    pub model_or_alias: Option<ModelOrAlias>,
    pub quota_info: Option<QuotaInfo>,
    #[serde(default)]
    pub supports_images: bool,
    #[serde(default)]
    pub is_recommended: bool,
    pub tag_title: Option<String>,
    /// Either a list of types or a `{type: bool}` map, depending on server version.
    #[serde(default)]
    pub supported_mime_types: Option<Value>,
}

impl ClientModelConfig {
    /// The model constant, falling back to the label.
    pub fn model_id(&self) -> String {
        self.model_or_alias
            .as_ref()
            .and_then(|m| m.model.clone().or_else(|| m.alias.clone()))
            .unwrap_or_else(|| self.label.clone())
    }

    pub fn mime_types(&self) -> Vec<String> {
        match &self.supported_mime_types {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            Some(Value::Object(map)) => {
                let mut types: Vec<String> = map
                    .iter()
                    .filter(|(_, enabled)| enabled.as_bool().unwrap_or(true))
                    .map(|(name, _)| name.clone())
                    .collect();
                types.sort();
                types
            }
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelOrAlias {
    pub model: Option<String>,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaInfo {
    #[serde(default, deserialize_with = "lenient_f64")]
    pub remaining_fraction: Option<f64>,
    pub reset_time: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientModelSort {
    pub name: Option<String>,
    #[serde(default)]
    pub groups: Vec<ClientModelSortGroup>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientModelSortGroup {
    #[serde(default)]
    pub model_labels: Vec<String>,
}

/// Accept numbers and numeric strings; the server encodes 64-bit values as strings.
fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_numeric_strings_are_accepted() {
        let status: PlanStatus = serde_json::from_value(json!({
            "planInfo": { "planName": "Pro", "monthlyPromptCredits": "50000" },
            "availablePromptCredits": 12500
        }))
        .unwrap();
        assert_eq!(status.available_prompt_credits, Some(12500.0));
        assert_eq!(status.plan_info.unwrap().monthly_prompt_credits, Some(50000.0));
    }

    #[test]
    fn test_mime_types_accept_list_and_map() {
        let listed: ClientModelConfig =
            serde_json::from_value(json!({ "label": "A", "supportedMimeTypes": ["image/png"] }))
                .unwrap();
        assert_eq!(listed.mime_types(), vec!["image/png".to_string()]);

        let mapped: ClientModelConfig = serde_json::from_value(json!({
            "label": "B",
            "supportedMimeTypes": { "image/webp": true, "image/png": true, "video/mp4": false }
        }))
        .unwrap();
        assert_eq!(
            mapped.mime_types(),
            vec!["image/png".to_string(), "image/webp".to_string()]
        );
    }

    #[test]
    fn test_model_id_falls_back_to_label() {
        let config: ClientModelConfig = serde_json::from_value(json!({ "label": "Mystery" })).unwrap();
        assert_eq!(config.model_id(), "Mystery");
    }

    #[test]
    fn test_recommended_order_uses_first_sort() {
        let data: CascadeModelConfigData = serde_json::from_value(json!({
            "clientModelSorts": [
                { "name": "Recommended", "groups": [
                    { "modelLabels": ["B", "A"] },
                    { "modelLabels": ["C"] }
                ]},
                { "name": "Other", "groups": [{ "modelLabels": ["Z"] }] }
            ]
        }))
        .unwrap();
        assert_eq!(data.recommended_order(), vec!["B", "A", "C"]);
    }
}
