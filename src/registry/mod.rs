//! Model registry — loads the YAML model catalog, applies overrides, and
//! serves the frozen, read-only lookup/filter surface the rest of the
//! router depends on.
//!
//! A "load once, serve many readers" shape: a single load-then-freeze
//! lifecycle rather than a streaming-merge one, since this registry has no
//! live-provider-data layer to merge against.

pub mod fetch;
pub mod overrides;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

pub use overrides::ModelOverride;

use crate::selector::SelectionMode;
use crate::types::{ModelDefinition, ModelKind};
use crate::{Result, RouterError};

/// Where the YAML catalog is acquired from.
#[derive(Debug, Clone)]
pub enum CatalogSource {
    /// Parse a local file directly; failures are fatal.
    Path(PathBuf),
    /// Fetch from a URL, falling back to `cache_path` on fetch failure if a
    /// cached copy exists.
    Url { url: String, cache_path: PathBuf },
}

#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub source: CatalogSource,
    pub overrides: Vec<ModelOverride>,
}

/// Filter predicates plus routing knobs for a single selection round
/// narrowing the candidate set before scoring.
#[derive(Debug, Clone, Default)]
pub struct SelectionCriteria {
    /// Comma-split OR-groups of `&`-joined AND-tags, DNF semantics.
    pub tags: Option<String>,
    pub model_type: Option<ModelKind>,
    pub min_context_size: Option<usize>,
    pub min_max_output_tokens: Option<usize>,
    pub json_response: Option<bool>,
    pub supports_image: Option<bool>,
    pub supports_video: Option<bool>,
    pub supports_audio: Option<bool>,
    pub supports_file: Option<bool>,
    pub supports_tools: Option<bool>,
    pub supports_vision: Option<bool>,
    pub provider: Option<String>,

    pub exclude_models: Vec<String>,
    pub prefer_fast: bool,
    pub min_success_rate: Option<f64>,
    pub selection_mode: SelectionMode,
}

/// Parses the `tags` DNF string into OR-groups of required tags.
fn parse_tag_groups(raw: &str) -> Vec<Vec<String>> {
    raw.split(',')
        .map(|group| {
            group
                .split('&')
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect()
        })
        .filter(|group: &Vec<String>| !group.is_empty())
        .collect()
}

fn tags_match(model_tags: &std::collections::HashSet<String>, groups: &[Vec<String>]) -> bool {
    groups
        .iter()
        .any(|group| group.iter().all(|tag| model_tags.contains(tag)))
}

/// Frozen, read-only collection of model definitions.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    by_name: HashMap<String, Arc<ModelDefinition>>,
}

impl ModelRegistry {
    /// Build a registry directly from an already-materialized model list,
    /// without overrides or validation beyond uniqueness. Used by tests and
    /// by [`Self::load`] after override application.
    pub fn from_models(models: Vec<ModelDefinition>) -> Self {
        let by_name = models
            .into_iter()
            .map(|m| (m.name.clone(), Arc::new(m)))
            .collect();
        Self { by_name }
    }

    fn validate(models: &[ModelDefinition]) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for model in models {
            if !seen.insert(&model.name) {
                return Err(RouterError::Configuration(format!(
                    "duplicate model name in catalog: {}",
                    model.name
                )));
            }
            if !(1..=100).contains(&model.weight) {
                return Err(RouterError::Configuration(format!(
                    "model {} weight {} out of range [1,100]",
                    model.name, model.weight
                )));
            }
            if model.context_size == 0 || model.max_output_tokens == 0 {
                return Err(RouterError::Configuration(format!(
                    "model {} must have positive context_size/max_output_tokens",
                    model.name
                )));
            }
        }
        Ok(())
    }

    /// Acquire the catalog, apply overrides, validate, and freeze.
    pub async fn load(config: &RegistryConfig) -> Result<Self> {
        let mut models = match &config.source {
            CatalogSource::Path(path) => fetch::load_from_path(path)?,
            CatalogSource::Url { url, cache_path } => match fetch::fetch_remote(url).await {
                Ok(models) => {
                    let _ = fetch::save_cache(cache_path, &models);
                    models
                }
                Err(err) => fetch::load_cached(cache_path).ok_or(err)?,
            },
        };

        overrides::apply_overrides(&mut models, &config.overrides);
        Self::validate(&models)?;
        Ok(Self::from_models(models))
    }

    pub fn get_all(&self) -> Vec<Arc<ModelDefinition>> {
        self.by_name.values().cloned().collect()
    }

    pub fn get_available(&self) -> Vec<Arc<ModelDefinition>> {
        self.by_name.values().filter(|m| m.available).cloned().collect()
    }

    pub fn find_by_name(&self, name: &str) -> Option<Arc<ModelDefinition>> {
        if let Some((provider, bare)) = name.split_once('/') {
            return self.find_by_name_and_provider(bare, Some(provider));
        }
        self.by_name.get(name).cloned()
    }

    pub fn find_by_name_and_provider(
        &self,
        name: &str,
        provider: Option<&str>,
    ) -> Option<Arc<ModelDefinition>> {
        let model = self.by_name.get(name)?;
        match provider {
            Some(p) if p != model.provider => None,
            _ => Some(model.clone()),
        }
    }

    /// Every available model matching all predicates in `criteria`.
    pub fn filter(&self, criteria: &SelectionCriteria) -> Vec<Arc<ModelDefinition>> {
        let tag_groups = criteria.tags.as_deref().map(parse_tag_groups);

        self.get_available()
            .into_iter()
            .filter(|m| {
                if let Some(groups) = &tag_groups {
                    if !tags_match(&m.tags, groups) {
                        return false;
                    }
                }
                if let Some(kind) = criteria.model_type {
                    if m.kind != kind {
                        return false;
                    }
                }
                if let Some(min) = criteria.min_context_size {
                    if m.context_size < min {
                        return false;
                    }
                }
                if let Some(min) = criteria.min_max_output_tokens {
                    if m.max_output_tokens < min {
                        return false;
                    }
                }
                if let Some(want) = criteria.json_response {
                    if m.json_response != want {
                        return false;
                    }
                }
                if let Some(want) = criteria.supports_image {
                    if m.supports_image != want {
                        return false;
                    }
                }
                if let Some(want) = criteria.supports_video {
                    if m.supports_video != want {
                        return false;
                    }
                }
                if let Some(want) = criteria.supports_audio {
                    if m.supports_audio != want {
                        return false;
                    }
                }
                if let Some(want) = criteria.supports_file {
                    if m.supports_file != want {
                        return false;
                    }
                }
                if let Some(want) = criteria.supports_tools {
                    if m.supports_tools != want {
                        return false;
                    }
                }
                if let Some(want) = criteria.supports_vision {
                    if m.supports_vision != want {
                        return false;
                    }
                }
                if let Some(provider) = &criteria.provider {
                    if &m.provider != provider {
                        return false;
                    }
                }
                true
            })
            .collect()
    }
}
