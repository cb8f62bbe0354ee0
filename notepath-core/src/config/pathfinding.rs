//! Path-finding and embedding configuration types.
//!
//! These types define the resolved (non-optional) settings used by
//! `notepath-graph`. They are created from the user-facing TOML structs
//! via `From`.

use serde::{Deserialize, Serialize};

use super::settings::{EmbeddingToolsSettings, PathFindingToolsSettings};

/// Resolved path-finding settings (all values filled with defaults).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathFindingSettings {
    #[serde(default = "default_max_hops")]
    pub max_hops: usize,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_neighbor_limit")]
    pub neighbor_limit: usize,
    #[serde(default = "default_include_semantic")]
    pub include_semantic: bool,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_temporal_timeout_ms")]
    pub temporal_timeout_ms: u64,
}

impl Default for PathFindingSettings {
    fn default() -> Self {
        Self {
            max_hops: default_max_hops(),
            max_results: default_max_results(),
            neighbor_limit: default_neighbor_limit(),
            include_semantic: default_include_semantic(),
            timeout_ms: default_timeout_ms(),
            temporal_timeout_ms: default_temporal_timeout_ms(),
        }
    }
}

/// Resolved embedding provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingSettings {
    #[serde(default = "default_embedding_url")]
    pub url: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default)]
    pub dim: Option<usize>,
    #[serde(default = "default_embedding_batch")]
    pub batch: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            url: default_embedding_url(),
            model: default_embedding_model(),
            dim: None,
            batch: default_embedding_batch(),
        }
    }
}

fn default_max_hops() -> usize {
    4
}

fn default_max_results() -> usize {
    5
}

fn default_neighbor_limit() -> usize {
    20
}

fn default_include_semantic() -> bool {
    true
}

fn default_timeout_ms() -> u64 {
    15_000
}

fn default_temporal_timeout_ms() -> u64 {
    3_000
}

fn default_embedding_url() -> String {
    "http://127.0.0.1:11434".to_string()
}

fn default_embedding_model() -> String {
    "qwen3-embedding:8b".to_string()
}

fn default_embedding_batch() -> usize {
    32
}

impl From<&PathFindingToolsSettings> for PathFindingSettings {
    fn from(value: &PathFindingToolsSettings) -> Self {
        let mut settings = PathFindingSettings::default();
        if let Some(max_hops) = value.max_hops {
            settings.max_hops = max_hops;
        }
        if let Some(max_results) = value.max_results {
            settings.max_results = max_results;
        }
        if let Some(limit) = value.neighbor_limit {
            settings.neighbor_limit = limit;
        }
        if let Some(include) = value.include_semantic {
            settings.include_semantic = include;
        }
        if let Some(timeout) = value.timeout_ms {
            settings.timeout_ms = timeout;
        }
        if let Some(timeout) = value.temporal_timeout_ms {
            settings.temporal_timeout_ms = timeout;
        }
        settings
    }
}

impl From<&EmbeddingToolsSettings> for EmbeddingSettings {
    fn from(value: &EmbeddingToolsSettings) -> Self {
        let mut settings = EmbeddingSettings::default();
        if let Some(url) = &value.url {
            settings.url = url.clone();
        }
        if let Some(model) = &value.model {
            settings.model = model.clone();
        }
        if let Some(dim) = value.dim {
            settings.dim = Some(dim);
        }
        if let Some(batch) = value.batch {
            settings.batch = batch;
        }
        settings
    }
}
