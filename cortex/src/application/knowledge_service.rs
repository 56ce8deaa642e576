// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Knowledge Service
//!
//! Owns one graph store, one vector index and an event bus, and runs the
//! ingestion path over them: reconcile a batch, apply it to the graph, then
//! index the notes it created.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Boundary between the graph store and the vector index
//!
//! The two stores are written separately. A failure after the graph write
//! leaves the index behind the graph; [`KnowledgeService::reconcile_indexes`]
//! reports the drift and [`KnowledgeService::repair_indexes`] closes it.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

use crate::application::consolidation::{ConsolidationConfig, ConsolidationEngine};
use crate::application::reconciler::UpdateReconciler;
use crate::domain::{
    ApplyOutcome, ConsolidationSettings, CortexConfig, CortexError, CortexEvent, EmbeddingConfig,
    GraphBackendConfig, GraphNode, GraphQueryResult, KnowledgeGraphUpdate, NodeId, NodeKind, Result,
    SearchResult, VectorBackendConfig, VectorDocument,
};
use crate::infrastructure::embedding_client::{FallbackEmbedder, OllamaEmbeddingClient};
use crate::infrastructure::event_bus::{publish_or_warn, BroadcastEventBus, EventBus};
use crate::infrastructure::graph_store::InMemoryGraphRepository;
use crate::infrastructure::repository::{EmbeddingProvider, GraphRepository, VectorRepository};
use crate::infrastructure::vector_store::InMemoryVectorRepository;

/// What one ingested batch did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestReport {
    /// Updates received before reconciliation
    pub submitted: usize,
    /// Updates applied after reconciliation
    pub applied: usize,
    pub outcome: ApplyOutcome,
    pub indexed_documents: usize,
}

/// Drift between Note nodes and indexed documents
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexReconciliation {
    /// Notes in the graph without an indexed document
    pub missing_from_index: Vec<NodeId>,
    /// Indexed documents without a Note node
    pub orphaned_documents: Vec<String>,
}

impl IndexReconciliation {
    pub fn is_consistent(&self) -> bool {
        self.missing_from_index.is_empty() && self.orphaned_documents.is_empty()
    }
}

/// Index document for a Note node; `None` for other kinds.
pub fn note_document(node: &GraphNode) -> Option<VectorDocument> {
    let note = node.note()?;
    Some(
        VectorDocument::new(node.id.as_str(), note.content.clone())
            .with_metadata("folder", note.folder.clone())
            .with_metadata("filename", note.filename.clone())
            .with_metadata("nodeId", node.id.as_str()),
    )
}

pub struct KnowledgeService {
    graph: Arc<dyn GraphRepository>,
    vectors: Arc<dyn VectorRepository>,
    reconciler: UpdateReconciler,
    event_bus: Arc<dyn EventBus>,
}

impl KnowledgeService {
    pub fn new(
        graph: Arc<dyn GraphRepository>,
        vectors: Arc<dyn VectorRepository>,
        event_bus: Arc<dyn EventBus>,
    ) -> Self {
        Self {
            graph,
            vectors,
            reconciler: UpdateReconciler::new(),
            event_bus,
        }
    }

    /// In-memory graph, in-memory index with fallback embeddings
    pub fn in_memory(event_bus: Arc<dyn EventBus>) -> Self {
        Self::new(
            Arc::new(InMemoryGraphRepository::new()),
            Arc::new(InMemoryVectorRepository::new()),
            event_bus,
        )
    }

    pub async fn from_config(config: &CortexConfig) -> Result<Self> {
        Self::from_config_with_bus(config, Arc::new(BroadcastEventBus::default())).await
    }

    /// Build the backends named by `config`.
    pub async fn from_config_with_bus(config: &CortexConfig, event_bus: Arc<dyn EventBus>) -> Result<Self> {
        config
            .validate()
            .map_err(|e| CortexError::Config(e.to_string()))?;

        let embedder = build_embedder(&config.embedding);
        let embedder_name = embedder.name();
        let graph = build_graph(&config.graph).await?;
        let vectors = build_vectors(&config.vector, &config.embedding, embedder).await?;

        info!(
            graph = graph_backend_name(&config.graph),
            vector = vector_backend_name(&config.vector),
            embedder = embedder_name,
            "Knowledge service initialized"
        );
        Ok(Self::new(graph, vectors, event_bus))
    }

    pub fn graph(&self) -> Arc<dyn GraphRepository> {
        self.graph.clone()
    }

    pub fn vectors(&self) -> Arc<dyn VectorRepository> {
        self.vectors.clone()
    }

    pub fn event_bus(&self) -> Arc<dyn EventBus> {
        self.event_bus.clone()
    }

    /// Consolidation engine over this service's graph and event bus
    pub fn consolidation_engine(&self, settings: &ConsolidationSettings) -> ConsolidationEngine {
        ConsolidationEngine::new(
            self.graph.clone(),
            self.event_bus.clone(),
            ConsolidationConfig::from(settings),
        )
    }

    /// Reconcile, apply, then index created notes.
    ///
    /// A graph failure aborts before anything is indexed. An index failure is
    /// returned after the graph write has already happened.
    pub async fn ingest(&self, updates: Vec<KnowledgeGraphUpdate>) -> Result<IngestReport> {
        let submitted = updates.len();
        let reconciled = self.reconciler.reconcile(updates);
        let applied = reconciled.len();

        let outcome = self.graph.apply_updates(&reconciled).await?;
        self.publish_created(&outcome).await;

        let documents: Vec<VectorDocument> = outcome.created_notes().filter_map(note_document).collect();
        let indexed_documents = self.index(documents).await?;

        debug!(submitted, applied, indexed_documents, "Ingested update batch");
        Ok(IngestReport {
            submitted,
            applied,
            outcome,
            indexed_documents,
        })
    }

    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>> {
        self.vectors.search(query, limit).await
    }

    pub async fn query(&self, topic: &str) -> Result<GraphQueryResult> {
        self.graph.query(topic).await
    }

    pub async fn reconcile_indexes(&self) -> Result<IndexReconciliation> {
        let notes = self.graph.nodes_of_kind(NodeKind::Note).await?;
        let indexed: Vec<String> = self.vectors.document_ids().await?;

        let indexed_set: HashSet<&str> = indexed.iter().map(String::as_str).collect();
        let note_set: HashSet<&str> = notes.iter().map(|node| node.id.as_str()).collect();

        let missing_from_index = notes
            .iter()
            .filter(|node| !indexed_set.contains(node.id.as_str()))
            .map(|node| node.id.clone())
            .collect();
        let orphaned_documents = indexed
            .iter()
            .filter(|id| !note_set.contains(id.as_str()))
            .cloned()
            .collect();

        Ok(IndexReconciliation {
            missing_from_index,
            orphaned_documents,
        })
    }

    /// Index missing notes and drop orphaned documents. Returns the drift
    /// found before repairing.
    pub async fn repair_indexes(&self) -> Result<IndexReconciliation> {
        let report = self.reconcile_indexes().await?;
        if report.is_consistent() {
            return Ok(report);
        }

        let mut documents = Vec::with_capacity(report.missing_from_index.len());
        for id in &report.missing_from_index {
            if let Some(document) = self.graph.get_node(id).await?.as_ref().and_then(note_document) {
                documents.push(document);
            }
        }
        self.index(documents).await?;

        for id in &report.orphaned_documents {
            self.vectors.delete_document(id).await?;
            publish_or_warn(
                self.event_bus.as_ref(),
                CortexEvent::DocumentRemoved {
                    document_id: id.clone(),
                    timestamp: Utc::now(),
                },
            )
            .await;
        }

        info!(
            indexed = report.missing_from_index.len(),
            removed = report.orphaned_documents.len(),
            "Repaired vector index"
        );
        Ok(report)
    }

    async fn index(&self, documents: Vec<VectorDocument>) -> Result<usize> {
        if documents.is_empty() {
            return Ok(0);
        }
        let ids: Vec<String> = documents.iter().map(|document| document.id.clone()).collect();
        self.vectors.add_documents(documents).await?;

        for document_id in &ids {
            publish_or_warn(
                self.event_bus.as_ref(),
                CortexEvent::DocumentIndexed {
                    document_id: document_id.clone(),
                    timestamp: Utc::now(),
                },
            )
            .await;
        }
        Ok(ids.len())
    }

    async fn publish_created(&self, outcome: &ApplyOutcome) {
        for node in &outcome.created_nodes {
            publish_or_warn(
                self.event_bus.as_ref(),
                CortexEvent::NodeCreated {
                    node_id: node.id.to_string(),
                    node_type: node.kind().as_str().to_string(),
                    timestamp: node.created_at,
                },
            )
            .await;
        }
        for link in &outcome.created_links {
            publish_or_warn(
                self.event_bus.as_ref(),
                CortexEvent::LinkCreated {
                    link_id: link.id.to_string(),
                    source: link.source.to_string(),
                    target: link.target.to_string(),
                    relationship: link.relationship.clone(),
                    timestamp: link.created_at,
                },
            )
            .await;
        }
    }
}

fn graph_backend_name(config: &GraphBackendConfig) -> &'static str {
    match config {
        GraphBackendConfig::InMemory => "in_memory",
        GraphBackendConfig::Neo4j { .. } => "neo4j",
    }
}

fn vector_backend_name(config: &VectorBackendConfig) -> &'static str {
    match config {
        VectorBackendConfig::InMemory => "in_memory",
        VectorBackendConfig::Qdrant { .. } => "qdrant",
    }
}

fn build_embedder(config: &EmbeddingConfig) -> Arc<dyn EmbeddingProvider> {
    match config {
        EmbeddingConfig::Fallback => Arc::new(FallbackEmbedder),
        EmbeddingConfig::Ollama { endpoint, model, .. } => {
            Arc::new(OllamaEmbeddingClient::new(endpoint.clone(), model.clone()))
        }
    }
}

async fn build_graph(config: &GraphBackendConfig) -> Result<Arc<dyn GraphRepository>> {
    match config {
        GraphBackendConfig::InMemory => Ok(Arc::new(InMemoryGraphRepository::new())),
        GraphBackendConfig::Neo4j { uri, user, password } => connect_neo4j(uri, user, password).await,
    }
}

#[cfg(feature = "neo4j")]
async fn connect_neo4j(uri: &str, user: &str, password: &str) -> Result<Arc<dyn GraphRepository>> {
    use crate::domain::config::resolve_secret;
    use crate::infrastructure::neo4j_store::Neo4jGraphRepository;

    let password = resolve_secret(password).map_err(|e| CortexError::Config(e.to_string()))?;
    let repository = Neo4jGraphRepository::connect(uri, user, &password).await?;
    repository.initialize().await?;
    Ok(Arc::new(repository))
}

#[cfg(not(feature = "neo4j"))]
async fn connect_neo4j(_uri: &str, _user: &str, _password: &str) -> Result<Arc<dyn GraphRepository>> {
    Err(CortexError::Config(
        "the neo4j graph backend requires the `neo4j` feature".to_string(),
    ))
}

async fn build_vectors(
    config: &VectorBackendConfig,
    embedding: &EmbeddingConfig,
    embedder: Arc<dyn EmbeddingProvider>,
) -> Result<Arc<dyn VectorRepository>> {
    match config {
        VectorBackendConfig::InMemory => Ok(Arc::new(InMemoryVectorRepository::with_embedder(embedder))),
        VectorBackendConfig::Qdrant { url, collection } => {
            connect_qdrant(url, collection, embedding, embedder).await
        }
    }
}

#[cfg(feature = "qdrant")]
async fn connect_qdrant(
    url: &str,
    collection: &str,
    embedding: &EmbeddingConfig,
    embedder: Arc<dyn EmbeddingProvider>,
) -> Result<Arc<dyn VectorRepository>> {
    use crate::infrastructure::embedding_client::FALLBACK_DIMENSIONS;
    use crate::infrastructure::qdrant_repository::QdrantVectorRepository;

    let dimensions = match embedding {
        EmbeddingConfig::Fallback => FALLBACK_DIMENSIONS as u64,
        EmbeddingConfig::Ollama {
            dimensions: Some(dimensions),
            ..
        } => *dimensions,
        // Ask the model once when the size is not configured
        EmbeddingConfig::Ollama { dimensions: None, .. } => embedder.embed("dimension probe").await?.len() as u64,
    };

    let repository = QdrantVectorRepository::new(url, collection, dimensions, embedder)?;
    repository.initialize().await?;
    Ok(Arc::new(repository))
}

#[cfg(not(feature = "qdrant"))]
async fn connect_qdrant(
    _url: &str,
    _collection: &str,
    _embedding: &EmbeddingConfig,
    _embedder: Arc<dyn EmbeddingProvider>,
) -> Result<Arc<dyn VectorRepository>> {
    Err(CortexError::Config(
        "the qdrant vector backend requires the `qdrant` feature".to_string(),
    ))
}
