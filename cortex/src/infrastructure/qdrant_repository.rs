// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Qdrant implementation of the vector index
//!
//! Durable backend for [`VectorRepository`]. Point ids are UUIDv5 digests of
//! the document id (Qdrant only accepts UUID or integer ids); the original
//! id travels in the payload.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** Durable semantic index for note content

use async_trait::async_trait;
use qdrant_client::{
    qdrant::{
        value::Kind, CountPointsBuilder, CreateCollectionBuilder, DeletePointsBuilder, Distance,
        PointId, PointStruct, ScrollPointsBuilder, SearchPointsBuilder, UpsertPointsBuilder, Value,
        VectorParamsBuilder,
    },
    Qdrant,
};
use serde_json::Map;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::{CortexError, Result, SearchResult, VectorDocument};
use crate::infrastructure::repository::{EmbeddingProvider, VectorRepository};

pub const DEFAULT_COLLECTION: &str = "cortex_documents";

fn backend<E: std::fmt::Display>(context: &'static str) -> impl FnOnce(E) -> CortexError {
    move |e| CortexError::Backend(format!("{}: {}", context, e))
}

pub struct QdrantVectorRepository {
    client: Qdrant,
    collection: String,
    dimensions: u64,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl QdrantVectorRepository {
    pub fn new(
        url: &str,
        collection: impl Into<String>,
        dimensions: u64,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self> {
        let client = Qdrant::from_url(url)
            .build()
            .map_err(backend("Failed to create Qdrant client"))?;

        Ok(Self {
            client,
            collection: collection.into(),
            dimensions,
            embedder,
        })
    }

    /// Create the collection (cosine distance) if it does not exist.
    pub async fn initialize(&self) -> Result<()> {
        let exists = self
            .client
            .collection_exists(&self.collection)
            .await
            .map_err(backend("Failed to check collection existence"))?;

        if !exists {
            self.client
                .create_collection(
                    CreateCollectionBuilder::new(&self.collection)
                        .vectors_config(VectorParamsBuilder::new(self.dimensions, Distance::Cosine)),
                )
                .await
                .map_err(backend("Failed to create Qdrant collection"))?;
        }
        Ok(())
    }

    fn point_id(id: &str) -> PointId {
        PointId::from(Uuid::new_v5(&Uuid::NAMESPACE_OID, id.as_bytes()).to_string())
    }

    fn document_to_payload(document: &VectorDocument) -> HashMap<String, Value> {
        let mut payload = HashMap::new();
        payload.insert("id".to_string(), document.id.clone().into());
        payload.insert("content".to_string(), document.content.clone().into());

        // Metadata is an open map; keep it as one JSON string
        let metadata = serde_json::to_string(&document.metadata).unwrap_or_else(|_| "{}".to_string());
        payload.insert("metadata".to_string(), metadata.into());
        payload
    }

    fn payload_to_document(payload: &HashMap<String, Value>) -> Result<VectorDocument> {
        let metadata = Self::get_string_value(payload, "metadata").unwrap_or_else(|_| "{}".to_string());
        let metadata: Map<String, serde_json::Value> = serde_json::from_str(&metadata).unwrap_or_default();

        Ok(VectorDocument {
            id: Self::get_string_value(payload, "id")?,
            content: Self::get_string_value(payload, "content")?,
            metadata,
        })
    }

    fn get_string_value(payload: &HashMap<String, Value>, key: &str) -> Result<String> {
        let value = payload
            .get(key)
            .ok_or_else(|| CortexError::Backend(format!("Missing field: {}", key)))?;
        match &value.kind {
            Some(Kind::StringValue(s)) => Ok(s.clone()),
            _ => Err(CortexError::Backend(format!("Invalid type for field: {}", key))),
        }
    }

    async fn point(&self, document: VectorDocument) -> Result<PointStruct> {
        let embedding = self.embedder.embed(&document.content).await?;
        if embedding.len() != self.dimensions as usize {
            return Err(CortexError::Embedding(format!(
                "Invalid embedding dimension: expected {}, got {}",
                self.dimensions,
                embedding.len()
            )));
        }
        Ok(PointStruct::new(
            Self::point_id(&document.id),
            embedding,
            Self::document_to_payload(&document),
        ))
    }
}

#[async_trait]
impl VectorRepository for QdrantVectorRepository {
    async fn add_document(&self, document: VectorDocument) -> Result<()> {
        self.add_documents(vec![document]).await
    }

    async fn add_documents(&self, documents: Vec<VectorDocument>) -> Result<()> {
        if documents.is_empty() {
            return Ok(());
        }

        let mut points = Vec::with_capacity(documents.len());
        for document in documents {
            points.push(self.point(document).await?);
        }

        let count = points.len();
        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, points))
            .await
            .map_err(backend("Failed to store documents in Qdrant"))?;

        debug!(count, collection = %self.collection, "Upserted documents");
        Ok(())
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>> {
        let query_embedding = self.embedder.embed(query).await?;

        let search_result = self
            .client
            .search_points(
                SearchPointsBuilder::new(&self.collection, query_embedding, limit as u64).with_payload(true),
            )
            .await
            .map_err(backend("Failed to search documents in Qdrant"))?;

        let mut results = Vec::with_capacity(search_result.result.len());
        for scored_point in search_result.result {
            let document = Self::payload_to_document(&scored_point.payload)?;
            results.push(SearchResult {
                id: document.id,
                content: document.content,
                metadata: document.metadata,
                similarity: f64::from(scored_point.score),
            });
        }
        Ok(results)
    }

    async fn delete_document(&self, id: &str) -> Result<()> {
        self.client
            .delete_points(DeletePointsBuilder::new(&self.collection).points(vec![Self::point_id(id)]))
            .await
            .map_err(backend("Failed to delete document from Qdrant"))?;
        Ok(())
    }

    async fn document_ids(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        let mut offset: Option<PointId> = None;
        let mut iteration_count = 0;
        const MAX_ITERATIONS: usize = 1000;

        loop {
            if iteration_count >= MAX_ITERATIONS {
                warn!("Reached maximum iteration limit while scrolling documents");
                break;
            }

            let mut builder = ScrollPointsBuilder::new(&self.collection)
                .with_payload(true)
                .limit(100);
            if let Some(ref offset_id) = offset {
                builder = builder.offset(offset_id.clone());
            }

            let scroll_result = self
                .client
                .scroll(builder)
                .await
                .map_err(backend("Failed to scroll documents"))?;

            if scroll_result.result.is_empty() {
                break;
            }
            for point in &scroll_result.result {
                ids.push(Self::get_string_value(&point.payload, "id")?);
            }

            offset = scroll_result.next_page_offset;
            if offset.is_none() {
                break;
            }
            iteration_count += 1;
        }

        Ok(ids)
    }

    async fn count(&self) -> Result<usize> {
        let response = self
            .client
            .count(CountPointsBuilder::new(&self.collection).exact(true))
            .await
            .map_err(backend("Failed to count documents"))?;
        Ok(response.result.map(|r| r.count as usize).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::embedding_client::{FallbackEmbedder, FALLBACK_DIMENSIONS};

    async fn repository() -> QdrantVectorRepository {
        let repo = QdrantVectorRepository::new(
            "http://localhost:6334",
            "cortex_documents_test",
            FALLBACK_DIMENSIONS as u64,
            Arc::new(FallbackEmbedder),
        )
        .expect("Failed to create repository");
        repo.initialize().await.expect("Failed to initialize");
        repo
    }

    #[test]
    fn test_point_ids_are_stable() {
        assert_eq!(
            QdrantVectorRepository::point_id("note-1"),
            QdrantVectorRepository::point_id("note-1")
        );
    }

    #[test]
    fn test_payload_roundtrip() {
        let document = VectorDocument::new("note-1", "hello world").with_metadata("folder", "/X/");
        let payload = QdrantVectorRepository::document_to_payload(&document);
        let restored = QdrantVectorRepository::payload_to_document(&payload).unwrap();
        assert_eq!(restored, document);
    }

    #[tokio::test]
    #[ignore] // Requires running Qdrant instance
    async fn test_store_search_delete() {
        let repo = repository().await;

        repo.add_document(VectorDocument::new("note-1", "hello world"))
            .await
            .expect("Failed to store document");

        let results = repo.search("hello world", 5).await.expect("Failed to search");
        assert_eq!(results[0].id, "note-1");
        assert!(results[0].similarity > 0.99);

        repo.delete_document("note-1").await.expect("Failed to delete");
        assert!(!repo.document_ids().await.unwrap().contains(&"note-1".to_string()));
    }
}
