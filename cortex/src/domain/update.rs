// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Knowledge graph updates - the only write path into a graph store.
//!
//! On the wire an update is `{ "type", "action", "data" }`. Here the
//! `(type, data)` pair is a closed enum, so a malformed `data` object is
//! rejected when the update is deserialized instead of when it is applied.
//!
//! [`KnowledgeGraphUpdate::operation`] maps each `(type, action)` pair onto
//! the [`GraphOperation`] a backend executes. Pairs without defined
//! semantics are rejected with [`CortexError::UnsupportedAction`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use super::error::CortexError;
use super::graph::{clamp_strength, NodeId, NotePayload};

fn default_relationship() -> String {
    "related".to_string()
}

fn default_strength() -> f64 {
    0.5
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateType {
    Note,
    Link,
    Tag,
    LearningPath,
    LearningProgress,
    MetaPattern,
}

impl fmt::Display for UpdateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UpdateType::Note => "note",
            UpdateType::Link => "link",
            UpdateType::Tag => "tag",
            UpdateType::LearningPath => "learning_path",
            UpdateType::LearningProgress => "learning_progress",
            UpdateType::MetaPattern => "meta_pattern",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateAction {
    Create,
    Update,
    Delete,
    Merge,
}

impl fmt::Display for UpdateAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UpdateAction::Create => "create",
            UpdateAction::Update => "update",
            UpdateAction::Delete => "delete",
            UpdateAction::Merge => "merge",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkData {
    pub source: NodeId,
    pub target: NodeId,
    #[serde(default = "default_relationship")]
    pub relationship: String,
    #[serde(default = "default_strength")]
    pub strength: f64,
    #[serde(default)]
    pub bidirectional: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagData {
    pub tags: Vec<String>,
    /// Note the tags were extracted from; links the note to each tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note_id: Option<NodeId>,
}

impl TagData {
    /// Sorted copy of the tags; equal for arrays that differ only in order.
    pub fn set_key(&self) -> Vec<String> {
        let mut key = self.tags.clone();
        key.sort();
        key
    }
}

/// Typed `(type, data)` pair of an update.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdatePayload {
    Note(NotePayload),
    Link(LinkData),
    Tag(TagData),
    LearningPath(Value),
    LearningProgress(Value),
    MetaPattern(Value),
}

impl UpdatePayload {
    pub fn update_type(&self) -> UpdateType {
        match self {
            UpdatePayload::Note(_) => UpdateType::Note,
            UpdatePayload::Link(_) => UpdateType::Link,
            UpdatePayload::Tag(_) => UpdateType::Tag,
            UpdatePayload::LearningPath(_) => UpdateType::LearningPath,
            UpdatePayload::LearningProgress(_) => UpdateType::LearningProgress,
            UpdatePayload::MetaPattern(_) => UpdateType::MetaPattern,
        }
    }

    fn parse(update_type: UpdateType, data: Value) -> Result<Self, CortexError> {
        let invalid = |e: serde_json::Error| {
            CortexError::Validation(format!("invalid {} payload: {}", update_type, e))
        };
        Ok(match update_type {
            UpdateType::Note => UpdatePayload::Note(serde_json::from_value(data).map_err(invalid)?),
            UpdateType::Link => UpdatePayload::Link(serde_json::from_value(data).map_err(invalid)?),
            UpdateType::Tag => UpdatePayload::Tag(serde_json::from_value(data).map_err(invalid)?),
            UpdateType::LearningPath => UpdatePayload::LearningPath(data),
            UpdateType::LearningProgress => UpdatePayload::LearningProgress(data),
            UpdateType::MetaPattern => UpdatePayload::MetaPattern(data),
        })
    }

    fn to_value(&self) -> Value {
        match self {
            UpdatePayload::Note(note) => serde_json::to_value(note).unwrap_or(Value::Null),
            UpdatePayload::Link(link) => serde_json::to_value(link).unwrap_or(Value::Null),
            UpdatePayload::Tag(tags) => serde_json::to_value(tags).unwrap_or(Value::Null),
            UpdatePayload::LearningPath(value)
            | UpdatePayload::LearningProgress(value)
            | UpdatePayload::MetaPattern(value) => value.clone(),
        }
    }
}

/// An external input event produced by the organizing collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawUpdate", into = "RawUpdate")]
pub struct KnowledgeGraphUpdate {
    pub action: UpdateAction,
    pub payload: UpdatePayload,
}

#[derive(Serialize, Deserialize)]
struct RawUpdate {
    #[serde(rename = "type")]
    update_type: UpdateType,
    action: UpdateAction,
    #[serde(default)]
    data: Value,
}

impl TryFrom<RawUpdate> for KnowledgeGraphUpdate {
    type Error = CortexError;

    fn try_from(raw: RawUpdate) -> Result<Self, Self::Error> {
        Ok(Self {
            action: raw.action,
            payload: UpdatePayload::parse(raw.update_type, raw.data)?,
        })
    }
}

impl From<KnowledgeGraphUpdate> for RawUpdate {
    fn from(update: KnowledgeGraphUpdate) -> Self {
        Self {
            update_type: update.update_type(),
            action: update.action,
            data: update.payload.to_value(),
        }
    }
}

impl KnowledgeGraphUpdate {
    pub fn new(action: UpdateAction, payload: UpdatePayload) -> Self {
        Self { action, payload }
    }

    /// Build an update from its untyped parts, validating `data`.
    pub fn from_parts(update_type: UpdateType, action: UpdateAction, data: Value) -> Result<Self, CortexError> {
        RawUpdate { update_type, action, data }.try_into()
    }

    pub fn create_note(note: NotePayload) -> Self {
        Self::new(UpdateAction::Create, UpdatePayload::Note(note))
    }

    pub fn create_link(link: LinkData) -> Self {
        Self::new(UpdateAction::Create, UpdatePayload::Link(link))
    }

    pub fn create_tags<I, S>(tags: I, note_id: Option<NodeId>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            UpdateAction::Create,
            UpdatePayload::Tag(TagData {
                tags: tags.into_iter().map(Into::into).collect(),
                note_id,
            }),
        )
    }

    pub fn update_type(&self) -> UpdateType {
        self.payload.update_type()
    }

    /// Resolve the graph operation this update stands for.
    pub fn operation(&self) -> Result<GraphOperation, CortexError> {
        use UpdateAction::*;
        use UpdatePayload as P;

        let op = match (&self.payload, self.action) {
            (P::Note(note), Create) => GraphOperation::CreateNote(note.clone()),
            (P::Link(link), Create) => GraphOperation::CreateLink(link.clone()),
            (P::Link(link), Update) => GraphOperation::SetLinkStrength {
                source: link.source.clone(),
                target: link.target.clone(),
                strength: clamp_strength(link.strength),
                mode: StrengthMode::Replace,
            },
            (P::Link(link), Merge) => GraphOperation::SetLinkStrength {
                source: link.source.clone(),
                target: link.target.clone(),
                strength: clamp_strength(link.strength),
                mode: StrengthMode::Max,
            },
            (P::Link(link), Delete) => GraphOperation::DeleteLinks {
                source: link.source.clone(),
                target: link.target.clone(),
                relationship: (link.relationship != default_relationship())
                    .then(|| link.relationship.clone()),
            },
            (P::Tag(tags), Create) => GraphOperation::CreateTags {
                tags: tags.tags.clone(),
                note_id: tags.note_id.clone(),
            },
            (P::LearningPath(value), Create) | (P::LearningProgress(value), Create | Update) => {
                GraphOperation::UpsertLearningPath {
                    id: addressed_id(value),
                    payload: value.clone(),
                }
            }
            (P::MetaPattern(value), Create) => GraphOperation::CreateMetaPattern(value.clone()),
            (payload, action) => {
                return Err(CortexError::UnsupportedAction {
                    update_type: payload.update_type(),
                    action,
                })
            }
        };
        Ok(op)
    }
}

/// `data.id` of an opaque payload, when it is a string.
fn addressed_id(value: &Value) -> Option<NodeId> {
    value.get("id").and_then(Value::as_str).map(NodeId::from)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrengthMode {
    /// Overwrite with the supplied strength
    Replace,
    /// Keep the larger of current and supplied
    Max,
}

/// Backend-neutral mutation derived from an update.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphOperation {
    CreateNote(NotePayload),
    CreateLink(LinkData),
    CreateTags {
        tags: Vec<String>,
        note_id: Option<NodeId>,
    },
    /// Replace the addressed LearningPath node, or create a new one.
    UpsertLearningPath {
        id: Option<NodeId>,
        payload: Value,
    },
    CreateMetaPattern(Value),
    SetLinkStrength {
        source: NodeId,
        target: NodeId,
        strength: f64,
        mode: StrengthMode,
    },
    DeleteLinks {
        source: NodeId,
        target: NodeId,
        relationship: Option<String>,
    },
}
