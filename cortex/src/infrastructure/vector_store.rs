// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! In-memory vector index.
//!
//! Embeddings are computed before the index lock is taken, so a slow
//! embedding service never blocks concurrent searches.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::domain::{Result, SearchResult, VectorDocument};
use crate::infrastructure::embedding_client::FallbackEmbedder;
use crate::infrastructure::repository::{EmbeddingProvider, VectorRepository};

/// Cosine similarity in [-1, 1].
///
/// Vectors of different length, or with zero magnitude, have similarity 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f64 = a.iter().zip(b.iter()).map(|(x, y)| f64::from(*x) * f64::from(*y)).sum();
    let magnitude_a: f64 = a.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();
    let magnitude_b: f64 = b.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return 0.0;
    }

    (dot_product / (magnitude_a * magnitude_b)).clamp(-1.0, 1.0)
}

struct IndexedDocument {
    document: VectorDocument,
    embedding: Vec<f32>,
}

/// In-memory implementation of VectorRepository
#[derive(Clone)]
pub struct InMemoryVectorRepository {
    documents: Arc<RwLock<Vec<IndexedDocument>>>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl InMemoryVectorRepository {
    /// Index backed by the deterministic fallback embedding.
    pub fn new() -> Self {
        Self::with_embedder(Arc::new(FallbackEmbedder))
    }

    pub fn with_embedder(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            documents: Arc::new(RwLock::new(Vec::new())),
            embedder,
        }
    }

    async fn index(&self, document: VectorDocument) -> Result<IndexedDocument> {
        let embedding = self.embedder.embed(&document.content).await?;
        Ok(IndexedDocument { document, embedding })
    }
}

impl Default for InMemoryVectorRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorRepository for InMemoryVectorRepository {
    async fn add_document(&self, document: VectorDocument) -> Result<()> {
        self.add_documents(vec![document]).await
    }

    async fn add_documents(&self, documents: Vec<VectorDocument>) -> Result<()> {
        let mut indexed = Vec::with_capacity(documents.len());
        for document in documents {
            indexed.push(self.index(document).await?);
        }

        let mut store = self.documents.write().await;
        for entry in indexed {
            store.retain(|existing| existing.document.id != entry.document.id);
            debug!(document_id = %entry.document.id, embedder = self.embedder.name(), "Indexed document");
            store.push(entry);
        }
        Ok(())
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>> {
        let query_embedding = self.embedder.embed(query).await?;
        let store = self.documents.read().await;

        let mut results: Vec<SearchResult> = store
            .iter()
            .map(|entry| SearchResult {
                id: entry.document.id.clone(),
                content: entry.document.content.clone(),
                metadata: entry.document.metadata.clone(),
                similarity: cosine_similarity(&query_embedding, &entry.embedding),
            })
            .collect();

        // Stable sort: equal scores keep insertion order
        results.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(limit);

        Ok(results)
    }

    async fn delete_document(&self, id: &str) -> Result<()> {
        let mut store = self.documents.write().await;
        store.retain(|entry| entry.document.id != id);
        Ok(())
    }

    async fn document_ids(&self) -> Result<Vec<String>> {
        let store = self.documents.read().await;
        Ok(store.iter().map(|entry| entry.document.id.clone()).collect())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.documents.read().await.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CortexError;

    #[test]
    fn test_cosine_symmetry_and_identity() {
        let a = [0.3_f32, -1.2, 4.0];
        let b = [2.0_f32, 0.5, -0.25];

        assert_eq!(cosine_similarity(&a, &b), cosine_similarity(&b, &a));
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_cosine_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]), -1.0);
    }

    #[tokio::test]
    async fn test_search_ranks_by_similarity() {
        let index = InMemoryVectorRepository::new();
        index
            .add_documents(vec![
                VectorDocument::new("a", "rust ownership borrowing"),
                VectorDocument::new("b", "rust rust rust"),
                VectorDocument::new("c", "bread flour water"),
            ])
            .await
            .unwrap();

        let results = index.search("rust", 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "b");
        assert!((results[0].similarity - 1.0).abs() < 1e-6);
        assert!(results[0].similarity >= results[1].similarity);
    }

    #[tokio::test]
    async fn test_add_replaces_same_id() {
        let index = InMemoryVectorRepository::new();
        index.add_document(VectorDocument::new("a", "first")).await.unwrap();
        index.add_document(VectorDocument::new("a", "second")).await.unwrap();

        assert_eq!(index.count().await.unwrap(), 1);
        let results = index.search("second", 5).await.unwrap();
        assert_eq!(results[0].content, "second");
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let index = InMemoryVectorRepository::new();
        index
            .add_document(VectorDocument::new("a", "draft").with_metadata("folder", "/X/"))
            .await
            .unwrap();

        index
            .update_document(VectorDocument::new("a", "final version"))
            .await
            .unwrap();
        let results = index.search("final", 1).await.unwrap();
        assert_eq!(results[0].content, "final version");
        assert!(results[0].metadata.is_empty());

        index.delete_document("a").await.unwrap();
        index.delete_document("a").await.unwrap();
        assert!(index.document_ids().await.unwrap().is_empty());
    }

    struct FailingEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FailingEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Err(CortexError::Embedding("service unavailable".to_string()))
        }

        fn name(&self) -> &'static str {
            "failing"
        }
    }

    #[tokio::test]
    async fn test_embedding_failure_propagates() {
        let index = InMemoryVectorRepository::with_embedder(Arc::new(FailingEmbedder));

        let err = index.add_document(VectorDocument::new("a", "text")).await.unwrap_err();
        assert!(matches!(err, CortexError::Embedding(_)));
        assert_eq!(index.count().await.unwrap(), 0);

        assert!(index.search("text", 3).await.is_err());
    }
}
