//! Catalog acquisition — local file, cached copy, or remote HTTP fetch.
//!
//! Local-cache-first startup, explicit refresh, atomic tmp+rename save, a
//! 30s client timeout, over a YAML `{models: [...]}` catalog of
//! [`ModelDefinition`]s.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{info, warn};

use crate::types::ModelDefinition;
use crate::{Result, RouterError};

/// Default local cache location for a remotely-fetched catalog.
pub fn default_cache_path() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("routeward")
        .join("catalog.yaml")
}

#[derive(Deserialize)]
struct CatalogFile {
    models: Vec<ModelDefinition>,
}

fn parse_catalog(yaml: &str) -> Result<Vec<ModelDefinition>> {
    let file: CatalogFile = serde_yaml::from_str(yaml)?;
    Ok(file.models)
}

/// Load and parse a catalog from a local path. Fails loudly: the Registry
/// is not usable if this fails.
pub fn load_from_path(path: &Path) -> Result<Vec<ModelDefinition>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        RouterError::Configuration(format!("failed to read catalog {}: {e}", path.display()))
    })?;
    parse_catalog(&content)
}

/// Load a previously-cached catalog, if present and well-formed. Missing or
/// corrupt cache is a soft failure (logged, `None`) since the caller falls
/// back to a remote fetch.
pub fn load_cached(path: &Path) -> Option<Vec<ModelDefinition>> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to read cached catalog");
            return None;
        }
    };
    match parse_catalog(&content) {
        Ok(models) => Some(models),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "corrupt cached catalog");
            None
        }
    }
}

/// Save a catalog to the local cache, atomically (tmp file + rename).
pub fn save_cache(path: &Path, models: &[ModelDefinition]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            RouterError::Configuration(format!(
                "failed to create cache dir {}: {e}",
                parent.display()
            ))
        })?;
    }

    let tmp_path = path.with_extension(format!("yaml.tmp.{}", std::process::id()));
    let yaml = serde_yaml::to_string(&CatalogFileRef { models })?;
    std::fs::write(&tmp_path, &yaml).map_err(|e| {
        RouterError::Configuration(format!("failed to write cache file {}: {e}", tmp_path.display()))
    })?;
    std::fs::rename(&tmp_path, path).map_err(|e| {
        RouterError::Configuration(format!(
            "failed to rename cache file {} -> {}: {e}",
            tmp_path.display(),
            path.display()
        ))
    })?;

    Ok(())
}

#[derive(serde::Serialize)]
struct CatalogFileRef<'a> {
    models: &'a [ModelDefinition],
}

/// Fetch a catalog from a remote URL. 30s timeout, no retry — the caller
/// decides whether to fall back to a cached copy.
pub async fn fetch_remote(url: &str) -> Result<Vec<ModelDefinition>> {
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()
        .map_err(RouterError::from)?;

    let response = client.get(url).send().await?;
    if !response.status().is_success() {
        return Err(RouterError::Configuration(format!(
            "catalog fetch returned HTTP {}",
            response.status()
        )));
    }
    let body = response.text().await?;
    parse_catalog(&body)
}

/// Fetch from `url` and persist to `cache_path`, returning the parsed
/// catalog.
pub async fn update_catalog(url: &str, cache_path: &Path) -> Result<Vec<ModelDefinition>> {
    info!(url, "fetching remote model catalog");
    let models = fetch_remote(url).await?;
    save_cache(cache_path, &models)?;
    info!(count = models.len(), path = %cache_path.display(), "saved catalog to cache");
    Ok(models)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_YAML: &str = r#"
models:
  - name: m1
    provider: openrouter
    model_id: openrouter/m1
    type: fast
    speed: fast
    context_size: 8192
    max_output_tokens: 4096
"#;

    #[test]
    fn parses_minimal_catalog() {
        let models = parse_catalog(SAMPLE_YAML).unwrap();
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].name, "m1");
        assert_eq!(models[0].weight, 1);
    }

    #[test]
    fn rejects_malformed_yaml() {
        assert!(parse_catalog("not: [valid, yaml: structure").is_err());
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.yaml");
        let models = parse_catalog(SAMPLE_YAML).unwrap();
        save_cache(&path, &models).unwrap();
        let loaded = load_cached(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name, "m1");
    }

    #[test]
    fn load_nonexistent_returns_none() {
        assert!(load_cached(Path::new("/nonexistent/path/catalog.yaml")).is_none());
    }

    #[test]
    fn load_corrupt_file_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.yaml");
        std::fs::write(&path, "not: [valid, yaml: structure").unwrap();
        assert!(load_cached(&path).is_none());
    }
}
