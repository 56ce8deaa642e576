// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Embedding Client
//!
//! Embedding providers for the vector index.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** Turns text into vectors for similarity search
//!
//! Without a configured embedding service the index uses
//! [`FallbackEmbedder`], a deterministic bag-of-words count vector. It is not
//! semantic; it exists so the system is fully functional offline, and its
//! construction (first-seen vocabulary order, 100-dimension cap) fixes the
//! ordering of search results, so it must not change.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::{CortexError, Result};
use crate::infrastructure::repository::EmbeddingProvider;

/// Dimension of fallback embeddings
pub const FALLBACK_DIMENSIONS: usize = 100;

/// Deterministic bag-of-words embedding.
///
/// Words are whitespace-separated and lowercased. Each distinct word gets the
/// next index in first-seen order; words whose index is 100 or more are
/// dropped from the vector. Counts are L2-normalized; an all-zero vector is
/// returned unnormalized.
pub fn fallback_embedding(content: &str) -> Vec<f32> {
    let mut vocabulary: HashMap<String, usize> = HashMap::new();
    let mut vector = vec![0.0_f32; FALLBACK_DIMENSIONS];

    for word in content.split_whitespace().map(str::to_lowercase) {
        let next = vocabulary.len();
        let index = *vocabulary.entry(word).or_insert(next);
        if index < FALLBACK_DIMENSIONS {
            vector[index] += 1.0;
        }
    }

    let magnitude = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        for x in vector.iter_mut() {
            *x /= magnitude;
        }
    }
    vector
}

/// Embedding provider used when no embedding service is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackEmbedder;

#[async_trait]
impl EmbeddingProvider for FallbackEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(fallback_embedding(text))
    }

    fn name(&self) -> &'static str {
        "fallback"
    }
}

/// Client for an Ollama embedding endpoint
pub struct OllamaEmbeddingClient {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

impl OllamaEmbeddingClient {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            model: model.into(),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/api/embeddings", self.endpoint.trim_end_matches('/'));
        let request = EmbeddingRequest {
            model: &self.model,
            prompt: text,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| CortexError::Embedding(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(CortexError::Embedding(format!("HTTP {}: {}", status, error_text)));
        }

        let body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| CortexError::Embedding(format!("Failed to parse response: {}", e)))?;

        if body.embedding.is_empty() {
            return Err(CortexError::Embedding(format!(
                "model '{}' returned an empty embedding",
                self.model
            )));
        }
        Ok(body.embedding)
    }

    fn name(&self) -> &'static str {
        "ollama"
    }
}
