// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Cortex Configuration
//!
//! YAML configuration naming the graph, vector and embedding backends plus
//! consolidation tuning.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Declarative backend selection and tuning
//!
//! # Discovery
//!
//! 1. Explicit path (fails if missing or invalid)
//! 2. `CORTEX_CONFIG_PATH` environment variable
//! 3. `./cortex-config.yaml`
//! 4. `~/.cortex/config.yaml`
//! 5. Built-in defaults (in-memory stores, fallback embeddings)
//!
//! Environment overrides are applied after loading in every case.
//!
//! # Example
//!
//! ```yaml
//! graph:
//!   backend: neo4j
//!   uri: bolt://localhost:7687
//!   user: neo4j
//!   password: env:NEO4J_PASSWORD
//! vector:
//!   backend: qdrant
//!   url: http://localhost:6334
//! embedding:
//!   provider: ollama
//!   endpoint: http://localhost:11434
//!   model: nomic-embed-text
//! consolidation:
//!   enabled: true
//!   interval_seconds: 3600
//!   prune_threshold: 0.05
//! log_level: info
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_PATH_ENV: &str = "CORTEX_CONFIG_PATH";

fn default_collection() -> String {
    "cortex_documents".to_string()
}

fn default_neo4j_user() -> String {
    "neo4j".to_string()
}

fn default_ollama_model() -> String {
    "nomic-embed-text".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Graph store backend
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum GraphBackendConfig {
    #[default]
    InMemory,
    Neo4j {
        uri: String,
        #[serde(default = "default_neo4j_user")]
        user: String,
        /// Supports "env:VAR_NAME"
        #[serde(default)]
        password: String,
    },
}

/// Vector index backend
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum VectorBackendConfig {
    #[default]
    InMemory,
    Qdrant {
        url: String,
        #[serde(default = "default_collection")]
        collection: String,
    },
}

/// Embedding provider for the vector index
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "snake_case")]
pub enum EmbeddingConfig {
    #[default]
    Fallback,
    Ollama {
        endpoint: String,
        #[serde(default = "default_ollama_model")]
        model: String,
        /// Vector size the model produces; required for Qdrant collections
        #[serde(default)]
        dimensions: Option<u64>,
    },
}

/// Consolidation engine and scheduler settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsolidationSettings {
    pub enabled: bool,
    pub interval_seconds: u64,
    pub lookback_hours: i64,
    pub window_seconds: i64,
    pub min_frequency: u32,
    pub new_connection_hours: i64,
    pub prune_threshold: Option<f64>,
    pub prune_after_days: Option<u32>,
}

impl Default for ConsolidationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_seconds: 3600,
            lookback_hours: 24,
            window_seconds: 300,
            min_frequency: 2,
            new_connection_hours: 24,
            prune_threshold: None,
            prune_after_days: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CortexConfig {
    #[serde(default)]
    pub graph: GraphBackendConfig,
    #[serde(default)]
    pub vector: VectorBackendConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub consolidation: ConsolidationSettings,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for CortexConfig {
    fn default() -> Self {
        Self {
            graph: GraphBackendConfig::default(),
            vector: VectorBackendConfig::default(),
            embedding: EmbeddingConfig::default(),
            consolidation: ConsolidationSettings::default(),
            log_level: default_log_level(),
        }
    }
}

/// Resolve "env:VAR_NAME" indirection; other values pass through.
pub fn resolve_secret(value: &str) -> anyhow::Result<String> {
    match value.strip_prefix("env:") {
        Some(var) => std::env::var(var)
            .map_err(|_| anyhow::anyhow!("Environment variable '{}' is not set", var)),
        None => Ok(value.to_string()),
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl CortexConfig {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// First existing config file in discovery order, if any
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./cortex-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".cortex").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        None
    }

    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        let mut config = if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            Self::from_yaml_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", path, e))?
        } else if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            Self::from_yaml_file(config_path)?
        } else {
            tracing::debug!("No configuration file found; using in-memory defaults");
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any key lookup
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(uri) = lookup("CORTEX_NEO4J_URI") {
            tracing::info!("Environment override: CORTEX_NEO4J_URI={}", uri);
            match &mut self.graph {
                GraphBackendConfig::Neo4j { uri: current, .. } => *current = uri,
                GraphBackendConfig::InMemory => {
                    self.graph = GraphBackendConfig::Neo4j {
                        uri,
                        user: default_neo4j_user(),
                        password: String::new(),
                    }
                }
            }
        }

        if let GraphBackendConfig::Neo4j { user, password, .. } = &mut self.graph {
            if let Some(value) = lookup("CORTEX_NEO4J_USER") {
                tracing::info!("Environment override: CORTEX_NEO4J_USER");
                *user = value;
            }
            if let Some(value) = lookup("CORTEX_NEO4J_PASSWORD") {
                tracing::info!("Environment override: CORTEX_NEO4J_PASSWORD");
                *password = value;
            }
        }

        if let Some(url) = lookup("CORTEX_QDRANT_URL") {
            tracing::info!("Environment override: CORTEX_QDRANT_URL={}", url);
            match &mut self.vector {
                VectorBackendConfig::Qdrant { url: current, .. } => *current = url,
                VectorBackendConfig::InMemory => {
                    self.vector = VectorBackendConfig::Qdrant {
                        url,
                        collection: default_collection(),
                    }
                }
            }
        }

        if let Some(endpoint) = lookup("CORTEX_OLLAMA_ENDPOINT") {
            tracing::info!("Environment override: CORTEX_OLLAMA_ENDPOINT={}", endpoint);
            match &mut self.embedding {
                EmbeddingConfig::Ollama { endpoint: current, .. } => *current = endpoint,
                EmbeddingConfig::Fallback => {
                    self.embedding = EmbeddingConfig::Ollama {
                        endpoint,
                        model: default_ollama_model(),
                        dimensions: None,
                    }
                }
            }
        }

        if let Some(val) = lookup("CORTEX_CONSOLIDATION_ENABLED") {
            match parse_flag(&val) {
                Some(enabled) => {
                    tracing::info!("Environment override: CORTEX_CONSOLIDATION_ENABLED={}", enabled);
                    self.consolidation.enabled = enabled;
                }
                None => {
                    tracing::warn!(
                        "Invalid value for CORTEX_CONSOLIDATION_ENABLED: '{}'. Expected true/false. Ignoring.",
                        val
                    );
                }
            }
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if let GraphBackendConfig::Neo4j { uri, user, .. } = &self.graph {
            if uri.is_empty() {
                anyhow::bail!("graph.uri cannot be empty for the neo4j backend");
            }
            if user.is_empty() {
                anyhow::bail!("graph.user cannot be empty for the neo4j backend");
            }
        }

        if let VectorBackendConfig::Qdrant { url, collection } = &self.vector {
            if url.is_empty() {
                anyhow::bail!("vector.url cannot be empty for the qdrant backend");
            }
            if collection.is_empty() {
                anyhow::bail!("vector.collection cannot be empty");
            }
        }

        if let EmbeddingConfig::Ollama { endpoint, model, dimensions } = &self.embedding {
            if endpoint.is_empty() {
                anyhow::bail!("embedding.endpoint cannot be empty for the ollama provider");
            }
            if model.is_empty() {
                anyhow::bail!("embedding.model cannot be empty");
            }
            if *dimensions == Some(0) {
                anyhow::bail!("embedding.dimensions must be positive");
            }
        }

        let consolidation = &self.consolidation;
        if consolidation.interval_seconds == 0 {
            anyhow::bail!("consolidation.interval_seconds must be positive");
        }
        if consolidation.window_seconds <= 0 {
            anyhow::bail!("consolidation.window_seconds must be positive");
        }
        if consolidation.lookback_hours <= 0 {
            anyhow::bail!("consolidation.lookback_hours must be positive");
        }
        if let Some(threshold) = consolidation.prune_threshold {
            if !(0.0..=1.0).contains(&threshold) {
                anyhow::bail!(
                    "consolidation.prune_threshold must be within [0, 1], got {}",
                    threshold
                );
            }
        }

        if self.log_level.trim().is_empty() {
            anyhow::bail!("log_level cannot be empty");
        }

        Ok(())
    }
}
