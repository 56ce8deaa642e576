// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Update Reconciler
//!
//! Normalizes a batch of pending updates before it reaches a graph store:
//!
//! - `tag` updates with the same set of tags for the same note collapse to
//!   the first one seen;
//! - `link/create` updates pointing at the same target collapse to the
//!   strongest one (the first one wins a tie). Other link actions are kept
//!   in place among the links.
//!
//! The output lists the links, then the deduplicated tags, then every other
//! update in its original relative order. Only the order within each group
//! is preserved.

use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::domain::{KnowledgeGraphUpdate, NodeId, UpdateAction, UpdatePayload};

#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateReconciler;

impl UpdateReconciler {
    pub fn new() -> Self {
        Self
    }

    pub fn reconcile(&self, updates: Vec<KnowledgeGraphUpdate>) -> Vec<KnowledgeGraphUpdate> {
        let incoming = updates.len();

        let mut links: Vec<KnowledgeGraphUpdate> = Vec::new();
        let mut link_slots: HashMap<NodeId, usize> = HashMap::new();
        let mut tags: Vec<KnowledgeGraphUpdate> = Vec::new();
        let mut seen_tag_sets: HashSet<(Vec<String>, Option<NodeId>)> = HashSet::new();
        let mut others: Vec<KnowledgeGraphUpdate> = Vec::new();

        for update in updates {
            match &update.payload {
                UpdatePayload::Link(_) if update.action != UpdateAction::Create => links.push(update),
                UpdatePayload::Link(link) => match link_slots.get(&link.target) {
                    Some(&slot) => {
                        if strength_of(&update) > strength_of(&links[slot]) {
                            links[slot] = update;
                        }
                    }
                    None => {
                        link_slots.insert(link.target.clone(), links.len());
                        links.push(update);
                    }
                },
                UpdatePayload::Tag(data) => {
                    if seen_tag_sets.insert((data.set_key(), data.note_id.clone())) {
                        tags.push(update);
                    }
                }
                _ => others.push(update),
            }
        }

        let mut reconciled = links;
        reconciled.extend(tags);
        reconciled.extend(others);

        debug!(incoming, outgoing = reconciled.len(), "Reconciled update batch");
        reconciled
    }
}

fn strength_of(update: &KnowledgeGraphUpdate) -> f64 {
    match &update.payload {
        UpdatePayload::Link(link) => link.strength,
        _ => f64::NEG_INFINITY,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{LinkData, NotePayload, UpdateType};
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

    fn link_strength(update: &KnowledgeGraphUpdate) -> f64 {
        strength_of(update)
    }

    #[test]
    fn test_links_to_same_target_keep_strongest() {
        let reconciled = UpdateReconciler::new().reconcile(vec![link("a", "t", 0.3), link("b", "t", 0.8)]);

        assert_eq!(reconciled.len(), 1);
        assert_eq!(link_strength(&reconciled[0]), 0.8);
    }

    #[test]
    fn test_link_tie_keeps_first() {
        let reconciled = UpdateReconciler::new().reconcile(vec![link("a", "t", 0.5), link("b", "t", 0.5)]);

        let UpdatePayload::Link(kept) = &reconciled[0].payload else {
            panic!("expected a link");
        };
        assert_eq!(kept.source, NodeId::from("a"));
    }

    #[test]
    fn test_set_equal_tag_updates_collapse() {
        let reconciled = UpdateReconciler::new().reconcile(vec![
            KnowledgeGraphUpdate::create_tags(["rust", "async"], Some("note-1".into())),
            KnowledgeGraphUpdate::create_tags(["async", "rust"], Some("note-1".into())),
            KnowledgeGraphUpdate::create_tags(["rust"], None),
            KnowledgeGraphUpdate::create_tags(["rust"], None),
        ]);

        assert_eq!(reconciled.len(), 2);
        let UpdatePayload::Tag(first) = &reconciled[0].payload else {
            panic!("expected tags");
        };
        assert_eq!(first.note_id, Some(NodeId::from("note-1")));
    }

    #[test]
    fn test_same_tags_for_different_notes_are_kept() {
        let reconciled = UpdateReconciler::new().reconcile(vec![
            KnowledgeGraphUpdate::create_tags(["rust"], Some("note-1".into())),
            KnowledgeGraphUpdate::create_tags(["rust"], Some("note-2".into())),
        ]);

        let note_ids: Vec<Option<NodeId>> = reconciled
            .iter()
            .map(|update| match &update.payload {
                UpdatePayload::Tag(data) => data.note_id.clone(),
                other => panic!("expected tags, got {:?}", other),
            })
            .collect();
        assert_eq!(note_ids, vec![Some("note-1".into()), Some("note-2".into())]);
    }

    #[test]
    fn test_link_delete_is_not_merged_with_create() {
        let mut delete = link("a", "t", 0.5);
        delete.action = UpdateAction::Delete;

        let reconciled = UpdateReconciler::new().reconcile(vec![link("b", "t", 0.9), delete.clone()]);

        assert_eq!(reconciled.len(), 2);
        assert_eq!(link_strength(&reconciled[0]), 0.9);
        assert_eq!(reconciled[1], delete);
    }

    #[test]
    fn test_link_update_does_not_displace_weaker_create() {
        let mut update = link("a", "t", 0.7);
        update.action = UpdateAction::Update;

        let reconciled = UpdateReconciler::new().reconcile(vec![
            link("b", "t", 0.2),
            update.clone(),
            link("c", "t", 0.4),
        ]);

        assert_eq!(reconciled.len(), 2);
        let UpdatePayload::Link(kept) = &reconciled[0].payload else {
            panic!("expected a link");
        };
        assert_eq!(kept.source, NodeId::from("c"));
        assert_eq!(reconciled[1], update);
    }

    #[test]
    fn test_group_order() {
        let note_a = KnowledgeGraphUpdate::create_note(NotePayload::new("/", "a", "a"));
        let note_b = KnowledgeGraphUpdate::create_note(NotePayload::new("/", "b", "b"));
        let pattern =
            KnowledgeGraphUpdate::from_parts(UpdateType::MetaPattern, crate::domain::UpdateAction::Create, json!({}))
                .unwrap();

        let reconciled = UpdateReconciler::new().reconcile(vec![
            note_a.clone(),
            KnowledgeGraphUpdate::create_tags(["x"], None),
            link("a", "t1", 0.2),
            pattern.clone(),
            link("a", "t2", 0.4),
            note_b.clone(),
        ]);

        let types: Vec<UpdateType> = reconciled.iter().map(|u| u.update_type()).collect();
        assert_eq!(
            types,
            vec![
                UpdateType::Link,
                UpdateType::Link,
                UpdateType::Tag,
                UpdateType::Note,
                UpdateType::MetaPattern,
                UpdateType::Note
            ]
        );
        assert_eq!(reconciled[3], note_a);
        assert_eq!(reconciled[4], pattern);
        assert_eq!(reconciled[5], note_b);
    }

    #[test]
    fn test_empty_batch() {
        assert!(UpdateReconciler::new().reconcile(Vec::new()).is_empty());
    }
}
