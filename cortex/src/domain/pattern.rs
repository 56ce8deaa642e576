// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::graph::NodeId;

/// One access of a note, as recorded by the activity log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityRecord {
    pub note_id: NodeId,
    /// ISO-8601 on the wire
    pub timestamp: DateTime<Utc>,
}

impl ActivityRecord {
    pub fn new(note_id: impl Into<NodeId>, timestamp: DateTime<Utc>) -> Self {
        Self {
            note_id: note_id.into(),
            timestamp,
        }
    }
}

/// Co-access of two notes within the consolidation window.
///
/// `source_note` sorts before `target_note`, so (A, B) and (B, A) are the
/// same pattern. Derived on every run and never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternMatch {
    pub source_note: NodeId,
    pub target_note: NodeId,
    pub frequency: u32,
    pub last_accessed: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsolidationResult {
    pub patterns_found: usize,
    pub links_strengthened: usize,
    pub insights_generated: usize,
    /// Human-readable report lines; not a stable format.
    pub insights: Vec<String>,
}
