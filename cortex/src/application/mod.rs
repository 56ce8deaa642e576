// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Application layer: ingestion, reconciliation and consolidation

pub mod consolidation;
pub mod consolidation_scheduler;
pub mod knowledge_service;
pub mod reconciler;

pub use consolidation::{ConsolidationConfig, ConsolidationEngine};
pub use consolidation_scheduler::{ConsolidationScheduler, ConsolidationSchedulerConfig, CycleReport};
pub use knowledge_service::{IndexReconciliation, IngestReport, KnowledgeService};
pub use reconciler::UpdateReconciler;
