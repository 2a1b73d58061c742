//! Per-model overrides applied to the catalog before the registry freezes.
//!
//! Patch semantics: only fields present in an override replace the
//! existing value, scoped to a handful of named fields by a matcher rather
//! than a whole-entry merge.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::types::ModelDefinition;

/// A single override entry from `ROUTER_MODEL_OVERRIDES` or the config file.
/// Matches one or more catalog entries by `(name, provider?, model_id?)` and
/// patches any subset of the listed fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelOverride {
    pub name: String,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub model_id: Option<String>,

    #[serde(default)]
    pub available: Option<bool>,
    #[serde(default)]
    pub weight: Option<u32>,
    #[serde(default)]
    pub priority: Option<u32>,
    #[serde(default)]
    pub max_concurrent: Option<u32>,
    #[serde(default)]
    pub tags: Option<HashSet<String>>,
}

impl ModelOverride {
    fn matches(&self, model: &ModelDefinition) -> bool {
        if self.name != model.name {
            return false;
        }
        if let Some(provider) = &self.provider {
            if provider != &model.provider {
                return false;
            }
        }
        if let Some(model_id) = &self.model_id {
            if model_id != &model.model_id {
                return false;
            }
        }
        true
    }

    fn apply_to(&self, model: &mut ModelDefinition) {
        if let Some(available) = self.available {
            model.available = available;
        }
        if let Some(weight) = self.weight {
            model.weight = weight;
        }
        if let Some(priority) = self.priority {
            model.priority = priority;
        }
        if let Some(max_concurrent) = self.max_concurrent {
            model.max_concurrent = Some(max_concurrent);
        }
        if let Some(tags) = &self.tags {
            model.tags = tags.clone();
        }
    }
}

/// Apply every override to every matching model in place. Overrides whose
/// matcher matches nothing are logged and otherwise ignored.
pub fn apply_overrides(models: &mut [ModelDefinition], overrides: &[ModelOverride]) {
    for ov in overrides {
        let mut matched = false;
        for model in models.iter_mut() {
            if ov.matches(model) {
                ov.apply_to(model);
                matched = true;
            }
        }
        if !matched {
            warn!(
                name = %ov.name,
                provider = ?ov.provider,
                model_id = ?ov.model_id,
                "model override matched no catalog entry, ignoring"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ModelKind, ModelSpeed};

    fn model(name: &str) -> ModelDefinition {
        ModelDefinition {
            name: name.to_string(),
            provider: "openrouter".to_string(),
            model_id: "id".to_string(),
            kind: ModelKind::Fast,
            speed: ModelSpeed::Fast,
            context_size: 8_192,
            max_output_tokens: 4_096,
            tags: HashSet::new(),
            json_response: false,
            supports_image: false,
            supports_video: false,
            supports_audio: false,
            supports_file: false,
            supports_tools: false,
            supports_vision: false,
            available: true,
            weight: 1,
            priority: 1,
            max_concurrent: None,
        }
    }

    #[test]
    fn override_patches_matched_field_only() {
        let mut models = vec![model("m1")];
        let overrides = vec![ModelOverride {
            name: "m1".to_string(),
            weight: Some(50),
            ..Default::default()
        }];
        apply_overrides(&mut models, &overrides);
        assert_eq!(models[0].weight, 50);
        assert_eq!(models[0].priority, 1);
    }

    #[test]
    fn override_scoped_by_provider_does_not_leak() {
        let mut models = vec![model("m1")];
        let overrides = vec![ModelOverride {
            name: "m1".to_string(),
            provider: Some("anthropic".to_string()),
            available: Some(false),
            ..Default::default()
        }];
        apply_overrides(&mut models, &overrides);
        assert!(models[0].available);
    }

    #[test]
    fn unmatched_override_is_ignored_without_panicking() {
        let mut models = vec![model("m1")];
        let overrides = vec![ModelOverride {
            name: "ghost".to_string(),
            available: Some(false),
            ..Default::default()
        }];
        apply_overrides(&mut models, &overrides);
        assert!(models[0].available);
    }
}
