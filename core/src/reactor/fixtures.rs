//! Status responses for tests.

use serde_json::{json, Value};

pub struct FixtureModel {
    label: &'static str,
    model_id: &'static str,
    fraction: Option<f64>,
    reset_time: &'static str,
}

impl FixtureModel {
    pub fn new(
        label: &'static str,
        model_id: &'static str,
        fraction: Option<f64>,
        reset_time: &'static str,
    ) -> Self {
        Self {
            label,
            model_id,
            fraction,
            reset_time,
        }
    }
}

/// A `GetUserStatus` response carrying `models`, with an optional recommended order.
pub fn status_response(models: &[FixtureModel], recommended: &[&str]) -> Value {
    let configs: Vec<Value> = models
        .iter()
        .map(|m| {
            let mut quota = json!({ "resetTime": m.reset_time });
            if let Some(fraction) = m.fraction {
                quota["remainingFraction"] = json!(fraction);
            }
            json!({
                "label": m.label,
                "modelOrAlias": { "model": m.model_id },
                "supportsImages": true,
                "isRecommended": false,
                "quotaInfo": quota,
                "supportedMimeTypes": { "image/png": true }
            })
        })
        .collect();

    let sorts = if recommended.is_empty() {
        json!([])
    } else {
        json!([{ "name": "Recommended", "groups": [{ "modelLabels": recommended }] }])
    };

    json!({
        "userStatus": {
            "name": "Dev",
            "email": "dev@example.com",
            "planStatus": {
                "planInfo": { "planName": "Pro", "monthlyPromptCredits": 1000 },
                "availablePromptCredits": 500
            },
            "userTier": { "id": "g1-pro-tier", "name": "Google AI Pro" },
            "cascadeModelConfigData": {
                "clientModelConfigs": configs,
                "clientModelSorts": sorts
            }
        }
    })
}
