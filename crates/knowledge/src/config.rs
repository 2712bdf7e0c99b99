//! Knowledge base configuration and on-disk layout.
//!
//! Everything for a base lives under `.wayfarer/knowledge/<base>/`:
//! `config.yaml`, `embeddings.sqlite` (the embedding cache) and `stats.json`.

use crate::types::{BaseStats, KnowledgeBaseConfig};
use std::fs;
use std::path::{Path, PathBuf};
use wayfarer_core::{AppError, AppResult};

/// Load knowledge base configuration, or defaults when no file exists.
pub fn load_config(workspace: &Path, base_name: &str) -> AppResult<KnowledgeBaseConfig> {
    let config_path = get_config_path(workspace, base_name);

    if !config_path.exists() {
        tracing::debug!(
            "Using default knowledge base config for '{}' (no config file found)",
            base_name
        );
        return Ok(KnowledgeBaseConfig {
            name: base_name.to_string(),
            ..Default::default()
        });
    }

    let content = fs::read_to_string(&config_path).map_err(|e| {
        AppError::Config(format!("Failed to read config at {:?}: {}", config_path, e))
    })?;

    let mut config: KnowledgeBaseConfig = serde_yaml::from_str(&content).map_err(|e| {
        AppError::Config(format!("Failed to parse config at {:?}: {}", config_path, e))
    })?;

    // The directory name is authoritative
    config.name = base_name.to_string();
    config.embedding.validate()?;
    config.chunking.validate()?;

    tracing::debug!("Loaded knowledge base config for '{}'", base_name);
    Ok(config)
}

/// Save knowledge base configuration.
pub fn save_config(workspace: &Path, config: &KnowledgeBaseConfig) -> AppResult<()> {
    let config_path = get_config_path(workspace, &config.name);
    ensure_parent(&config_path)?;

    let yaml = serde_yaml::to_string(config)?;
    fs::write(&config_path, yaml)?;

    tracing::debug!("Saved knowledge base config for '{}'", config.name);
    Ok(())
}

/// Read the stats written by the last refresh, if any.
pub fn load_stats(workspace: &Path, base_name: &str) -> AppResult<Option<BaseStats>> {
    let path = get_stats_path(workspace, base_name);
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&path)?;
    Ok(Some(serde_json::from_str(&content)?))
}

pub fn save_stats(workspace: &Path, stats: &BaseStats) -> AppResult<()> {
    let path = get_stats_path(workspace, &stats.name);
    ensure_parent(&path)?;
    fs::write(&path, serde_json::to_string_pretty(stats)?)?;
    Ok(())
}

fn ensure_parent(path: &Path) -> AppResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Resolve the data directory against the workspace.
pub fn resolve_data_dir(workspace: &Path, config: &KnowledgeBaseConfig) -> PathBuf {
    if config.data_dir.is_absolute() {
        config.data_dir.clone()
    } else {
        workspace.join(&config.data_dir)
    }
}

/// Get the base directory for a knowledge base.
pub fn get_base_dir(workspace: &Path, base_name: &str) -> PathBuf {
    workspace
        .join(".wayfarer")
        .join("knowledge")
        .join(base_name)
}

/// Get the path to a base's config file.
pub fn get_config_path(workspace: &Path, base_name: &str) -> PathBuf {
    get_base_dir(workspace, base_name).join("config.yaml")
}

/// Get the SQLite embedding cache path for a base.
pub fn get_cache_path(workspace: &Path, base_name: &str) -> PathBuf {
    get_base_dir(workspace, base_name).join("embeddings.sqlite")
}

/// Get the stats JSON path for a base.
pub fn get_stats_path(workspace: &Path, base_name: &str) -> PathBuf {
    get_base_dir(workspace, base_name).join("stats.json")
}
