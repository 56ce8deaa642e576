// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Domain events for the knowledge cortex.
//! Published to an event bus for observability and integration; stores
//! never depend on a subscriber being present.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CortexEvent {
    /// A node was created in the knowledge graph
    NodeCreated {
        node_id: String,
        node_type: String,
        timestamp: DateTime<Utc>,
    },

    /// A link was created in the knowledge graph
    LinkCreated {
        link_id: String,
        source: String,
        target: String,
        relationship: String,
        timestamp: DateTime<Utc>,
    },

    /// Consolidation reinforced co-accessed links
    LinksStrengthened {
        count: usize,
        timestamp: DateTime<Utc>,
    },

    /// A weak link was removed by the scheduler
    LinkPruned {
        link_id: String,
        final_strength: f64,
        timestamp: DateTime<Utc>,
    },

    /// Note content was written to the vector index
    DocumentIndexed {
        document_id: String,
        timestamp: DateTime<Utc>,
    },

    /// Indexed document with no backing note was removed
    DocumentRemoved {
        document_id: String,
        timestamp: DateTime<Utc>,
    },

    /// A consolidation run finished
    ConsolidationCompleted {
        patterns_found: usize,
        links_strengthened: usize,
        insights_generated: usize,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
}

impl CortexEvent {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            CortexEvent::NodeCreated { timestamp, .. } => *timestamp,
            CortexEvent::LinkCreated { timestamp, .. } => *timestamp,
            CortexEvent::LinksStrengthened { timestamp, .. } => *timestamp,
            CortexEvent::LinkPruned { timestamp, .. } => *timestamp,
            CortexEvent::DocumentIndexed { timestamp, .. } => *timestamp,
            CortexEvent::DocumentRemoved { timestamp, .. } => *timestamp,
            CortexEvent::ConsolidationCompleted { timestamp, .. } => *timestamp,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            CortexEvent::NodeCreated { .. } => "node_created",
            CortexEvent::LinkCreated { .. } => "link_created",
            CortexEvent::LinksStrengthened { .. } => "links_strengthened",
            CortexEvent::LinkPruned { .. } => "link_pruned",
            CortexEvent::DocumentIndexed { .. } => "document_indexed",
            CortexEvent::DocumentRemoved { .. } => "document_removed",
            CortexEvent::ConsolidationCompleted { .. } => "consolidation_completed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = CortexEvent::LinkCreated {
            link_id: "link-1".to_string(),
            source: "note-a".to_string(),
            target: "note-b".to_string(),
            relationship: "extends".to_string(),
            timestamp: Utc::now(),
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"link_created\""));

        let deserialized: CortexEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, deserialized);
    }
}
