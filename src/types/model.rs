//! Model catalog types — the immutable definition of one upstream model.
//!
//! A [`ModelDefinition`] is materialized from the YAML catalog and frozen
//! after overrides are applied (see `crate::registry`). It never changes for
//! the life of the process; mutable health data lives in `crate::state`.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Coarse model category used by selection filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    Fast,
    Reasoning,
}

/// Declared response speed tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelSpeed {
    Fast,
    Medium,
    Slow,
}

/// One upstream model entry from the catalog, after overrides are applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDefinition {
    /// Unique identifier across the whole fleet.
    pub name: String,
    /// Name of the provider adapter that owns this model.
    pub provider: String,
    /// Provider-side model identifier (may differ from `name`).
    pub model_id: String,
    #[serde(rename = "type")]
    pub kind: ModelKind,
    pub speed: ModelSpeed,
    pub context_size: usize,
    pub max_output_tokens: usize,
    #[serde(default)]
    pub tags: HashSet<String>,
    #[serde(default)]
    pub json_response: bool,
    #[serde(default)]
    pub supports_image: bool,
    #[serde(default)]
    pub supports_video: bool,
    #[serde(default)]
    pub supports_audio: bool,
    #[serde(default)]
    pub supports_file: bool,
    #[serde(default)]
    pub supports_tools: bool,
    #[serde(default)]
    pub supports_vision: bool,
    /// Administrative enable flag. A model with `available = false` is never
    /// selectable, regardless of circuit-breaker state.
    #[serde(default = "default_true")]
    pub available: bool,
    /// Static routing weight in `[1, 100]`, default 1.
    #[serde(default = "default_weight")]
    pub weight: u32,
    /// Lower value means higher priority, default 1.
    #[serde(default = "default_priority")]
    pub priority: u32,
    #[serde(default)]
    pub max_concurrent: Option<u32>,
}

fn default_true() -> bool {
    true
}

fn default_weight() -> u32 {
    1
}

fn default_priority() -> u32 {
    1
}

impl ModelDefinition {
    /// The `"provider/name"` form accepted by priority lists and overrides.
    pub fn provider_qualified_name(&self) -> String {
        format!("{}/{}", self.provider, self.name)
    }
}

/// Public-facing projection of a [`ModelDefinition`] for `GET /models`.
#[derive(Debug, Clone, Serialize)]
pub struct ModelListEntry {
    pub name: String,
    pub provider: String,
    #[serde(rename = "type")]
    pub kind: ModelKind,
    pub speed: ModelSpeed,
    pub context_size: usize,
    pub max_output_tokens: usize,
    pub tags: Vec<String>,
    pub json_response: bool,
    pub supports_vision: bool,
    pub supports_tools: bool,
    pub available: bool,
}

impl From<&ModelDefinition> for ModelListEntry {
    fn from(def: &ModelDefinition) -> Self {
        let mut tags: Vec<String> = def.tags.iter().cloned().collect();
        tags.sort();
        Self {
            name: def.name.clone(),
            provider: def.provider.clone(),
            kind: def.kind,
            speed: def.speed,
            context_size: def.context_size,
            max_output_tokens: def.max_output_tokens,
            tags,
            json_response: def.json_response,
            supports_vision: def.supports_vision,
            supports_tools: def.supports_tools,
            available: def.available,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ModelDefinition {
        ModelDefinition {
            name: "m1".into(),
            provider: "openrouter".into(),
            model_id: "vendor/m1".into(),
            kind: ModelKind::Fast,
            speed: ModelSpeed::Fast,
            context_size: 8192,
            max_output_tokens: 4096,
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
    fn provider_qualified_name_joins_with_slash() {
        assert_eq!(sample().provider_qualified_name(), "openrouter/m1");
    }

    #[test]
    fn list_entry_sorts_tags() {
        let mut def = sample();
        def.tags.insert("z".into());
        def.tags.insert("a".into());
        let entry: ModelListEntry = (&def).into();
        assert_eq!(entry.tags, vec!["a".to_string(), "z".to_string()]);
    }
}
