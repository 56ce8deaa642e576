// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! In-memory graph repository.
//!
//! All state sits behind one store-wide `RwLock`: readers run concurrently,
//! writers are exclusive, and a whole `apply_updates` batch is applied under
//! a single write guard so readers never observe half a batch.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::domain::{
    ApplyOutcome, CortexError, GraphLink, GraphNode, GraphOperation, GraphQueryResult, GraphStats,
    KnowledgeGraphUpdate, LinkId, NodeId, NodeKind, NodePayload, Result, StrengthMode,
    LINK_INCREMENT,
};
use crate::infrastructure::repository::GraphRepository;

const TAGGED_WITH: &str = "tagged_with";

/// Nodes and links in insertion order.
#[derive(Default)]
struct GraphState {
    nodes: Vec<GraphNode>,
    positions: HashMap<NodeId, usize>,
    links: Vec<GraphLink>,
}

impl GraphState {
    fn contains(&self, id: &NodeId) -> bool {
        self.positions.contains_key(id)
    }

    fn node(&self, id: &NodeId) -> Option<&GraphNode> {
        self.positions.get(id).map(|&pos| &self.nodes[pos])
    }

    fn node_mut(&mut self, id: &NodeId) -> Option<&mut GraphNode> {
        match self.positions.get(id) {
            Some(&pos) => Some(&mut self.nodes[pos]),
            None => None,
        }
    }

    fn insert_node(&mut self, node: GraphNode, outcome: &mut ApplyOutcome) {
        self.positions.insert(node.id.clone(), self.nodes.len());
        outcome.created_nodes.push(node.clone());
        self.nodes.push(node);
    }

    fn insert_link(&mut self, link: GraphLink, outcome: &mut ApplyOutcome) {
        outcome.created_links.push(link.clone());
        self.links.push(link);
    }

    fn link_mut(&mut self, source: &NodeId, target: &NodeId) -> Option<&mut GraphLink> {
        self.links.iter_mut().find(|link| link.connects(source, target))
    }

    fn apply(&mut self, operation: GraphOperation, outcome: &mut ApplyOutcome) -> Result<()> {
        match operation {
            GraphOperation::CreateNote(note) => {
                self.insert_node(GraphNode::new(NodePayload::Note(note)), outcome);
            }
            GraphOperation::CreateLink(data) => {
                let link = GraphLink::new(
                    data.source,
                    data.target,
                    data.relationship,
                    data.strength,
                    data.bidirectional,
                );
                self.insert_link(link, outcome);
            }
            GraphOperation::CreateTags { tags, note_id } => {
                for tag in tags.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
                    let tag_id = NodeId::for_tag(tag);
                    if !self.contains(&tag_id) {
                        let node = GraphNode::with_id(
                            tag_id.clone(),
                            NodePayload::Tag { name: tag.to_string() },
                        );
                        self.insert_node(node, outcome);
                    }

                    if let Some(note_id) = &note_id {
                        let exists = self.links.iter().any(|link| {
                            link.connects(note_id, &tag_id) && link.relationship == TAGGED_WITH
                        });
                        if !exists {
                            let link = GraphLink::new(note_id.clone(), tag_id, TAGGED_WITH, 1.0, false);
                            self.insert_link(link, outcome);
                        }
                    }
                }
            }
            GraphOperation::UpsertLearningPath { id, payload } => {
                let payload = NodePayload::LearningPath(payload);
                match id {
                    Some(id) => match self.node_mut(&id) {
                        Some(existing) => {
                            if !existing.replace_payload(payload) {
                                return Err(CortexError::Validation(format!(
                                    "node {} is a {}, not a LearningPath",
                                    id,
                                    existing.kind().as_str()
                                )));
                            }
                        }
                        None => self.insert_node(GraphNode::with_id(id, payload), outcome),
                    },
                    None => self.insert_node(GraphNode::new(payload), outcome),
                }
            }
            GraphOperation::CreateMetaPattern(payload) => {
                self.insert_node(GraphNode::new(NodePayload::MetaPattern(payload)), outcome);
            }
            GraphOperation::SetLinkStrength { source, target, strength, mode } => {
                if let Some(link) = self.link_mut(&source, &target) {
                    match mode {
                        StrengthMode::Replace => link.set_strength(strength),
                        StrengthMode::Max if strength > link.strength => link.set_strength(strength),
                        StrengthMode::Max => {}
                    }
                }
            }
            GraphOperation::DeleteLinks { source, target, relationship } => {
                self.links.retain(|link| {
                    let same_relationship = relationship
                        .as_deref()
                        .map_or(true, |rel| link.relationship == rel);
                    !(link.connects(&source, &target) && same_relationship)
                });
            }
        }
        Ok(())
    }

    fn weak_links(&self, days: Option<u32>, threshold: f64, now: DateTime<Utc>) -> Vec<GraphLink> {
        let cutoff = days.map(|d| now - Duration::days(i64::from(d)));
        self.links
            .iter()
            .filter(|link| link.strength < threshold)
            .filter(|link| cutoff.map_or(true, |cutoff| link.updated_at >= cutoff))
            .cloned()
            .collect()
    }
}

/// In-memory implementation of GraphRepository
#[derive(Clone, Default)]
pub struct InMemoryGraphRepository {
    state: Arc<RwLock<GraphState>>,
}

impl InMemoryGraphRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GraphRepository for InMemoryGraphRepository {
    async fn apply_updates(&self, updates: &[KnowledgeGraphUpdate]) -> Result<ApplyOutcome> {
        let mut state = self.state.write().await;
        let mut outcome = ApplyOutcome::default();

        for (index, update) in updates.iter().enumerate() {
            let operation = update.operation()?;
            debug!(index, update_type = %update.update_type(), action = %update.action, "Applying graph update");
            state.apply(operation, &mut outcome)?;
        }

        info!(
            updates = updates.len(),
            created_nodes = outcome.created_nodes.len(),
            created_links = outcome.created_links.len(),
            "Applied graph update batch"
        );
        Ok(outcome)
    }

    async fn query(&self, topic: &str) -> Result<GraphQueryResult> {
        let state = self.state.read().await;
        let topic = topic.to_lowercase();

        let nodes: Vec<GraphNode> = state
            .nodes
            .iter()
            .filter(|node| node.matches_topic(&topic))
            .cloned()
            .collect();

        let ids: HashSet<&NodeId> = nodes.iter().map(|node| &node.id).collect();
        let links = state
            .links
            .iter()
            .filter(|link| link.touches(&ids))
            .cloned()
            .collect();

        Ok(GraphQueryResult { nodes, links })
    }

    async fn query_weak_links(&self, days: Option<u32>, threshold: f64) -> Result<Vec<GraphLink>> {
        let state = self.state.read().await;
        Ok(state.weak_links(days, threshold, Utc::now()))
    }

    async fn increment_link_weight(&self, source: &NodeId, target: &NodeId) -> Result<bool> {
        let mut state = self.state.write().await;
        match state.link_mut(source, target) {
            Some(link) => {
                link.reinforce(LINK_INCREMENT);
                debug!(link_id = %link.id, strength = link.strength, "Reinforced link");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn increment_link_weights(&self, pairs: &[(NodeId, NodeId)]) -> Result<usize> {
        let mut state = self.state.write().await;
        let mut touched = 0;
        for (source, target) in pairs {
            if let Some(link) = state.link_mut(source, target) {
                link.reinforce(LINK_INCREMENT);
                touched += 1;
            }
        }
        Ok(touched)
    }

    async fn remove_link(&self, id: &LinkId) -> Result<()> {
        let mut state = self.state.write().await;
        state.links.retain(|link| &link.id != id);
        Ok(())
    }

    async fn get_node(&self, id: &NodeId) -> Result<Option<GraphNode>> {
        let state = self.state.read().await;
        Ok(state.node(id).cloned())
    }

    async fn nodes_of_kind(&self, kind: NodeKind) -> Result<Vec<GraphNode>> {
        let state = self.state.read().await;
        Ok(state
            .nodes
            .iter()
            .filter(|node| node.kind() == kind)
            .cloned()
            .collect())
    }

    async fn stats(&self) -> Result<GraphStats> {
        let state = self.state.read().await;
        Ok(GraphStats {
            node_count: state.nodes.len(),
            link_count: state.links.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{LinkData, NotePayload, UpdateAction, UpdatePayload};
    use serde_json::json;

    fn link(source: &str, target: &str, strength: f64) -> KnowledgeGraphUpdate {
        KnowledgeGraphUpdate::create_link(LinkData {
            source: source.into(),
            target: target.into(),
            relationship: "related".to_string(),
            strength,
            bidirectional: false,
        })
    }

    #[tokio::test]
    async fn test_note_then_topic_query() {
        let repo = InMemoryGraphRepository::new();
        let update: KnowledgeGraphUpdate = serde_json::from_value(json!({
            "type": "note",
            "action": "create",
            "data": { "folder": "/X/", "filename": "a", "content": "hello world" }
        }))
        .unwrap();

        repo.apply_updates(&[update]).await.unwrap();

        let result = repo.query("hello").await.unwrap();
        assert_eq!(result.nodes.len(), 1);
        assert_eq!(result.nodes[0].properties()["content"], "hello world");

        let result = repo.query("HELLO").await.unwrap();
        assert_eq!(result.nodes.len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_notes_are_distinct_nodes() {
        let repo = InMemoryGraphRepository::new();
        let note = KnowledgeGraphUpdate::create_note(NotePayload::new("/", "a", "same"));

        repo.apply_updates(&[note.clone(), note]).await.unwrap();

        let result = repo.query("same").await.unwrap();
        assert_eq!(result.nodes.len(), 2);
        assert_ne!(result.nodes[0].id, result.nodes[1].id);
    }

    #[tokio::test]
    async fn test_query_returns_links_touching_matches() {
        let repo = InMemoryGraphRepository::new();
        let outcome = repo
            .apply_updates(&[
                KnowledgeGraphUpdate::create_note(NotePayload::new("/", "a", "graph theory")),
                KnowledgeGraphUpdate::create_note(NotePayload::new("/", "b", "cooking")),
            ])
            .await
            .unwrap();
        let a = outcome.created_nodes[0].id.clone();
        let b = outcome.created_nodes[1].id.clone();

        repo.apply_updates(&[link(a.as_str(), b.as_str(), 0.5), link("x", "y", 0.5)])
            .await
            .unwrap();

        let result = repo.query("graph").await.unwrap();
        assert_eq!(result.nodes.len(), 1);
        assert_eq!(result.links.len(), 1);
        assert_eq!(result.links[0].target, b);
    }

    #[tokio::test]
    async fn test_tags_are_deduplicated() {
        let repo = InMemoryGraphRepository::new();
        let tags = KnowledgeGraphUpdate::create_tags(["Rust", "async"], None);

        repo.apply_updates(&[tags.clone(), tags]).await.unwrap();
        repo.apply_updates(&[KnowledgeGraphUpdate::create_tags(["rust"], None)])
            .await
            .unwrap();

        let tags = repo.nodes_of_kind(NodeKind::Tag).await.unwrap();
        assert_eq!(tags.len(), 2);
        assert_eq!(tags[0].id, NodeId::for_tag("rust"));
    }

    #[tokio::test]
    async fn test_tags_link_back_to_note_once() {
        let repo = InMemoryGraphRepository::new();
        let tags = KnowledgeGraphUpdate::create_tags(["rust"], Some("note-1".into()));

        repo.apply_updates(&[tags.clone(), tags]).await.unwrap();

        let stats = repo.stats().await.unwrap();
        assert_eq!(stats, GraphStats { node_count: 1, link_count: 1 });
    }

    #[tokio::test]
    async fn test_links_may_reference_unknown_nodes() {
        let repo = InMemoryGraphRepository::new();
        repo.apply_updates(&[link("later-a", "later-b", 0.4)]).await.unwrap();

        let stats = repo.stats().await.unwrap();
        assert_eq!(stats.node_count, 0);
        assert_eq!(stats.link_count, 1);
    }

    #[tokio::test]
    async fn test_increment_clamps_and_never_decreases() {
        let repo = InMemoryGraphRepository::new();
        repo.apply_updates(&[link("a", "b", 0.75)]).await.unwrap();

        let mut previous = 0.75;
        for _ in 0..10 {
            assert!(repo.increment_link_weight(&"a".into(), &"b".into()).await.unwrap());
            let strength = repo.query_weak_links(None, 2.0).await.unwrap()[0].strength;
            assert!(strength <= 1.0);
            assert!(strength >= previous);
            previous = strength;
        }
        assert_eq!(previous, 1.0);
    }

    #[tokio::test]
    async fn test_increment_is_order_sensitive_noop() {
        let repo = InMemoryGraphRepository::new();
        repo.apply_updates(&[link("a", "b", 0.5)]).await.unwrap();

        assert!(!repo.increment_link_weight(&"b".into(), &"a".into()).await.unwrap());
        assert!(!repo.increment_link_weight(&"x".into(), &"y".into()).await.unwrap());

        let links = repo.query_weak_links(None, 1.0).await.unwrap();
        assert_eq!(links[0].strength, 0.5);
    }

    #[tokio::test]
    async fn test_weak_links_by_threshold() {
        let repo = InMemoryGraphRepository::new();
        repo.apply_updates(&[link("a", "b", 0.1), link("a", "c", 0.5), link("a", "d", 0.9)])
            .await
            .unwrap();

        let weak = repo.query_weak_links(Some(7), 0.4).await.unwrap();
        assert_eq!(weak.len(), 1);
        assert_eq!(weak[0].strength, 0.1);
        assert_eq!(weak[0].target, NodeId::from("b"));
    }

    #[tokio::test]
    async fn test_weak_links_by_recency() {
        let repo = InMemoryGraphRepository::new();
        repo.apply_updates(&[link("a", "b", 0.1)]).await.unwrap();

        let state = repo.state.read().await;
        let now = Utc::now();
        assert_eq!(state.weak_links(Some(7), 0.4, now).len(), 1);
        assert_eq!(state.weak_links(Some(7), 0.4, now + Duration::days(8)).len(), 0);
        assert_eq!(state.weak_links(None, 0.4, now + Duration::days(8)).len(), 1);
    }

    #[tokio::test]
    async fn test_remove_link_is_idempotent() {
        let repo = InMemoryGraphRepository::new();
        let outcome = repo.apply_updates(&[link("a", "b", 0.3)]).await.unwrap();
        let id = outcome.created_links[0].id.clone();

        repo.remove_link(&id).await.unwrap();
        repo.remove_link(&id).await.unwrap();

        assert_eq!(repo.stats().await.unwrap().link_count, 0);
    }

    #[tokio::test]
    async fn test_unsupported_action_aborts_rest_of_batch() {
        let repo = InMemoryGraphRepository::new();
        let batch = vec![
            KnowledgeGraphUpdate::create_note(NotePayload::new("/", "a", "first")),
            KnowledgeGraphUpdate::new(
                UpdateAction::Delete,
                UpdatePayload::Note(NotePayload::new("/", "a", "first")),
            ),
            KnowledgeGraphUpdate::create_note(NotePayload::new("/", "b", "never")),
        ];

        let err = repo.apply_updates(&batch).await.unwrap_err();
        assert!(matches!(err, CortexError::UnsupportedAction { .. }));

        // No rollback: the first note stays, the third was never applied.
        assert_eq!(repo.stats().await.unwrap().node_count, 1);
        assert!(repo.query("never").await.unwrap().nodes.is_empty());
    }

    #[tokio::test]
    async fn test_link_merge_and_update_actions() {
        let repo = InMemoryGraphRepository::new();
        repo.apply_updates(&[link("a", "b", 0.5)]).await.unwrap();

        let change = |action, strength| {
            KnowledgeGraphUpdate::new(
                action,
                UpdatePayload::Link(LinkData {
                    source: "a".into(),
                    target: "b".into(),
                    relationship: "related".to_string(),
                    strength,
                    bidirectional: false,
                }),
            )
        };

        repo.apply_updates(&[change(UpdateAction::Merge, 0.2)]).await.unwrap();
        assert_eq!(repo.query_weak_links(None, 1.0).await.unwrap()[0].strength, 0.5);

        repo.apply_updates(&[change(UpdateAction::Merge, 0.7)]).await.unwrap();
        assert_eq!(repo.query_weak_links(None, 1.0).await.unwrap()[0].strength, 0.7);

        repo.apply_updates(&[change(UpdateAction::Update, 0.2)]).await.unwrap();
        assert_eq!(repo.query_weak_links(None, 1.0).await.unwrap()[0].strength, 0.2);

        repo.apply_updates(&[change(UpdateAction::Delete, 0.0)]).await.unwrap();
        assert_eq!(repo.stats().await.unwrap().link_count, 0);
    }

    #[tokio::test]
    async fn test_learning_progress_updates_existing_path() {
        let repo = InMemoryGraphRepository::new();
        let create = KnowledgeGraphUpdate::new(
            UpdateAction::Create,
            UpdatePayload::LearningPath(json!({ "id": "path-rust", "title": "Rust", "completed": 0 })),
        );
        let progress = KnowledgeGraphUpdate::new(
            UpdateAction::Update,
            UpdatePayload::LearningProgress(json!({ "id": "path-rust", "title": "Rust", "completed": 2 })),
        );

        repo.apply_updates(&[create, progress]).await.unwrap();

        let paths = repo.nodes_of_kind(NodeKind::LearningPath).await.unwrap();
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].id, NodeId::from("path-rust"));
        assert_eq!(paths[0].properties()["completed"], 2);
    }

    #[tokio::test]
    async fn test_learning_progress_cannot_retype_node() {
        let repo = InMemoryGraphRepository::new();
        repo.apply_updates(&[KnowledgeGraphUpdate::create_tags(["rust"], None)])
            .await
            .unwrap();

        let progress = KnowledgeGraphUpdate::new(
            UpdateAction::Update,
            UpdatePayload::LearningProgress(json!({ "id": "tag-rust" })),
        );
        let err = repo.apply_updates(&[progress]).await.unwrap_err();
        assert!(matches!(err, CortexError::Validation(_)));

        let node = repo.get_node(&"tag-rust".into()).await.unwrap().unwrap();
        assert_eq!(node.kind(), NodeKind::Tag);
    }

    #[tokio::test]
    async fn test_concurrent_readers_see_whole_batches() {
        let repo = InMemoryGraphRepository::new();
        let batch: Vec<_> = (0..50)
            .map(|i| KnowledgeGraphUpdate::create_note(NotePayload::new("/", format!("n{}", i), "batch")))
            .collect();

        let writer = {
            let repo = repo.clone();
            let batch = batch.clone();
            tokio::spawn(async move {
                for _ in 0..5 {
                    repo.apply_updates(&batch).await.unwrap();
                }
            })
        };
        let reader = {
            let repo = repo.clone();
            tokio::spawn(async move {
                for _ in 0..20 {
                    let count = repo.stats().await.unwrap().node_count;
                    assert_eq!(count % 50, 0);
                    tokio::task::yield_now().await;
                }
            })
        };

        writer.await.unwrap();
        reader.await.unwrap();
        assert_eq!(repo.stats().await.unwrap().node_count, 250);
    }
}
