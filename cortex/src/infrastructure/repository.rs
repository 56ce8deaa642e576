// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Repository interfaces for the knowledge cortex.
//! Defines the contracts for graph and vector storage; the in-memory
//! implementations are the full system of record when no durable backend
//! is configured.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    ApplyOutcome, GraphLink, GraphNode, GraphQueryResult, GraphStats, KnowledgeGraphUpdate, LinkId,
    NodeId, NodeKind, Result, SearchResult, VectorDocument,
};

/// Repository for the knowledge graph
#[async_trait]
pub trait GraphRepository: Send + Sync {
    /// Apply a batch of updates in order.
    ///
    /// The batch stops at the first failing update and the error is
    /// returned; updates applied before it stay applied.
    async fn apply_updates(&self, updates: &[KnowledgeGraphUpdate]) -> Result<ApplyOutcome>;

    /// Case-insensitive substring search over node properties, plus every
    /// link touching a matching node.
    async fn query(&self, topic: &str) -> Result<GraphQueryResult>;

    /// Links weaker than `threshold`, touched within the last `days` days
    /// (no recency filter when `days` is `None`).
    async fn query_weak_links(&self, days: Option<u32>, threshold: f64) -> Result<Vec<GraphLink>>;

    /// Reinforce the link with exactly this (source, target) pair.
    /// Returns `false` when there is no such link.
    async fn increment_link_weight(&self, source: &NodeId, target: &NodeId) -> Result<bool>;

    /// Reinforce several links at once; returns how many links were touched.
    async fn increment_link_weights(&self, pairs: &[(NodeId, NodeId)]) -> Result<usize>;

    /// Remove a link by id. Removing an unknown id is not an error.
    async fn remove_link(&self, id: &LinkId) -> Result<()>;

    async fn get_node(&self, id: &NodeId) -> Result<Option<GraphNode>>;

    async fn nodes_of_kind(&self, kind: NodeKind) -> Result<Vec<GraphNode>>;

    async fn stats(&self) -> Result<GraphStats>;
}

/// Repository for semantically indexed documents
#[async_trait]
pub trait VectorRepository: Send + Sync {
    /// Index one document, replacing any document with the same id.
    async fn add_document(&self, document: VectorDocument) -> Result<()>;

    async fn add_documents(&self, documents: Vec<VectorDocument>) -> Result<()>;

    /// Documents ranked by descending similarity to `query`.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>>;

    /// Remove a document. Removing an unknown id is not an error.
    async fn delete_document(&self, id: &str) -> Result<()>;

    /// Delete then re-add; the embedding is always recomputed.
    async fn update_document(&self, document: VectorDocument) -> Result<()> {
        self.delete_document(&document.id).await?;
        self.add_document(document).await
    }

    async fn document_ids(&self) -> Result<Vec<String>>;

    async fn count(&self) -> Result<usize>;
}

/// Source of embedding vectors
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Short name for logs
    fn name(&self) -> &'static str;
}

/// Provides the activity window for scheduled consolidation runs.
#[async_trait]
pub trait ActivitySource: Send + Sync {
    /// Accesses recorded since `since`, oldest first.
    async fn activities_since(&self, since: DateTime<Utc>) -> Result<Vec<crate::domain::ActivityRecord>>;

    /// Drop accesses older than `cutoff`; returns how many were dropped.
    /// Sources that keep their own retention leave this as a no-op.
    async fn expire_before(&self, _cutoff: DateTime<Utc>) -> Result<usize> {
        Ok(0)
    }
}
