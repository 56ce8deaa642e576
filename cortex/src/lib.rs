// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Brain Cortex
//!
//! Knowledge graph, semantic index and consolidation for a personal note
//! base. Collaborators submit batches of [`KnowledgeGraphUpdate`]s; the
//! [`KnowledgeService`](application::KnowledgeService) reconciles them,
//! applies them to a [`GraphRepository`] and indexes new notes in a
//! [`VectorRepository`]. The [`ConsolidationEngine`](application::ConsolidationEngine)
//! reinforces links between notes that are used together.
//!
//! # Architecture
//!
//! - **Layer:** Learning & Memory Layer
//! - **Purpose:** Long-term knowledge storage and retrieval
//!
//! In-memory backends are always available. Neo4j and Qdrant backends are
//! behind the `neo4j` and `qdrant` cargo features.

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod telemetry;

pub use domain::*;
pub use infrastructure::*;
