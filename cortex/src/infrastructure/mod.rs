// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Infrastructure layer for the knowledge cortex

pub mod activity_log;
pub mod embedding_client;
pub mod event_bus;
pub mod graph_store;
#[cfg(feature = "neo4j")]
pub mod neo4j_store;
#[cfg(feature = "qdrant")]
pub mod qdrant_repository;
pub mod repository;
pub mod vector_store;

pub use activity_log::InMemoryActivityLog;
pub use embedding_client::{FallbackEmbedder, OllamaEmbeddingClient};
pub use event_bus::{BroadcastEventBus, EventBus, NoopEventBus};
pub use graph_store::InMemoryGraphRepository;
#[cfg(feature = "neo4j")]
pub use neo4j_store::Neo4jGraphRepository;
#[cfg(feature = "qdrant")]
pub use qdrant_repository::QdrantVectorRepository;
pub use repository::{ActivitySource, EmbeddingProvider, GraphRepository, VectorRepository};
pub use vector_store::InMemoryVectorRepository;
