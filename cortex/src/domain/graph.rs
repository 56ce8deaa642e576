// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Knowledge graph entities: typed nodes and weighted links.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

/// Fixed amount added to a link's strength on each reinforcement.
pub const LINK_INCREMENT: f64 = 0.1;

/// Node identifier in the knowledge graph.
///
/// Ids are plain strings so collaborators can forward-reference nodes
/// (e.g. a link naming a note that is created later in the same batch).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    /// Fresh, unique id for a node of the given kind (`note-<uuid>`).
    pub fn generate(kind: NodeKind) -> Self {
        Self(format!("{}-{}", kind.id_prefix(), Uuid::new_v4().simple()))
    }

    /// Deterministic id for a tag: lowercased, trimmed, inner whitespace
    /// collapsed to `-`.
    pub fn for_tag(tag: &str) -> Self {
        let key = tag
            .split_whitespace()
            .map(str::to_lowercase)
            .collect::<Vec<_>>()
            .join("-");
        Self(format!("tag-{}", key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Link identifier in the knowledge graph
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LinkId(pub String);

impl LinkId {
    pub fn new() -> Self {
        Self(format!("link-{}", Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for LinkId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LinkId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Type of node in the knowledge graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Note,
    Tag,
    LearningPath,
    MetaPattern,
}

impl NodeKind {
    fn id_prefix(self) -> &'static str {
        match self {
            NodeKind::Note => "note",
            NodeKind::Tag => "tag",
            NodeKind::LearningPath => "path",
            NodeKind::MetaPattern => "pattern",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Note => "Note",
            NodeKind::Tag => "Tag",
            NodeKind::LearningPath => "LearningPath",
            NodeKind::MetaPattern => "MetaPattern",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Note" => Some(NodeKind::Note),
            "Tag" => Some(NodeKind::Tag),
            "LearningPath" => Some(NodeKind::LearningPath),
            "MetaPattern" => Some(NodeKind::MetaPattern),
            _ => None,
        }
    }
}

/// Note content as produced by the organizing collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotePayload {
    #[serde(default)]
    pub folder: String,
    #[serde(default)]
    pub filename: String,
    pub content: String,
    /// Any additional keys supplied alongside the note.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl NotePayload {
    pub fn new(folder: impl Into<String>, filename: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            folder: folder.into(),
            filename: filename.into(),
            content: content.into(),
            extra: Map::new(),
        }
    }
}

/// Per-kind node payload. The variant fixes the node's kind for its
/// whole lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "properties")]
pub enum NodePayload {
    Note(NotePayload),
    Tag { name: String },
    /// Opaque learning path document
    LearningPath(Value),
    /// Opaque meta-pattern document
    MetaPattern(Value),
}

impl NodePayload {
    pub fn kind(&self) -> NodeKind {
        match self {
            NodePayload::Note(_) => NodeKind::Note,
            NodePayload::Tag { .. } => NodeKind::Tag,
            NodePayload::LearningPath(_) => NodeKind::LearningPath,
            NodePayload::MetaPattern(_) => NodeKind::MetaPattern,
        }
    }

    /// JSON view of the payload, used for topic search and durable storage.
    pub fn properties(&self) -> Value {
        match self {
            NodePayload::Note(note) => serde_json::to_value(note).unwrap_or(Value::Null),
            NodePayload::Tag { name } => serde_json::json!({ "name": name }),
            NodePayload::LearningPath(value) | NodePayload::MetaPattern(value) => value.clone(),
        }
    }

    /// Rebuild a payload from its kind and JSON properties.
    pub fn from_properties(kind: NodeKind, properties: Value) -> serde_json::Result<Self> {
        Ok(match kind {
            NodeKind::Note => NodePayload::Note(serde_json::from_value(properties)?),
            NodeKind::Tag => {
                #[derive(Deserialize)]
                struct TagProps {
                    name: String,
                }
                let props: TagProps = serde_json::from_value(properties)?;
                NodePayload::Tag { name: props.name }
            }
            NodeKind::LearningPath => NodePayload::LearningPath(properties),
            NodeKind::MetaPattern => NodePayload::MetaPattern(properties),
        })
    }
}

/// Node in the knowledge graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: NodeId,
    #[serde(flatten)]
    pub payload: NodePayload,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GraphNode {
    /// Create a node with a freshly generated id.
    pub fn new(payload: NodePayload) -> Self {
        let id = NodeId::generate(payload.kind());
        Self::with_id(id, payload)
    }

    pub fn with_id(id: NodeId, payload: NodePayload) -> Self {
        let now = Utc::now();
        Self {
            id,
            payload,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn kind(&self) -> NodeKind {
        self.payload.kind()
    }

    pub fn properties(&self) -> Value {
        self.payload.properties()
    }

    /// Case-insensitive substring match against the serialized properties.
    pub fn matches_topic(&self, topic_lower: &str) -> bool {
        self.properties()
            .to_string()
            .to_lowercase()
            .contains(topic_lower)
    }

    /// Note content, if this is a note.
    pub fn note(&self) -> Option<&NotePayload> {
        match &self.payload {
            NodePayload::Note(note) => Some(note),
            _ => None,
        }
    }

    /// Replace an opaque payload, keeping the kind. Returns false (and
    /// leaves the node untouched) when the replacement would change kind.
    pub fn replace_payload(&mut self, payload: NodePayload) -> bool {
        if payload.kind() != self.kind() {
            return false;
        }
        self.payload = payload;
        self.updated_at = Utc::now();
        true
    }
}

/// Link in the knowledge graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphLink {
    pub id: LinkId,
    pub source: NodeId,
    pub target: NodeId,
    pub relationship: String,
    pub strength: f64,
    pub bidirectional: bool,
    pub created_at: DateTime<Utc>,
    /// Last time the link was created or strengthened.
    pub updated_at: DateTime<Utc>,
}

impl GraphLink {
    pub fn new(
        source: NodeId,
        target: NodeId,
        relationship: impl Into<String>,
        strength: f64,
        bidirectional: bool,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: LinkId::new(),
            source,
            target,
            relationship: relationship.into(),
            strength: clamp_strength(strength),
            bidirectional,
            created_at: now,
            updated_at: now,
        }
    }

    /// Add `amount` to the strength, saturating at 1.0.
    pub fn reinforce(&mut self, amount: f64) {
        self.set_strength(self.strength + amount);
    }

    pub fn set_strength(&mut self, strength: f64) {
        self.strength = clamp_strength(strength);
        self.updated_at = Utc::now();
    }

    pub fn connects(&self, source: &NodeId, target: &NodeId) -> bool {
        &self.source == source && &self.target == target
    }

    pub fn touches(&self, ids: &std::collections::HashSet<&NodeId>) -> bool {
        ids.contains(&self.source) || ids.contains(&self.target)
    }
}

/// Clamp a strength into [0, 1]. NaN collapses to 0.
pub fn clamp_strength(strength: f64) -> f64 {
    if strength.is_nan() {
        return 0.0;
    }
    strength.clamp(0.0, 1.0)
}

/// Result of a topic query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphQueryResult {
    pub nodes: Vec<GraphNode>,
    pub links: Vec<GraphLink>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphStats {
    pub node_count: usize,
    pub link_count: usize,
}

/// What a batch of updates created.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplyOutcome {
    pub created_nodes: Vec<GraphNode>,
    pub created_links: Vec<GraphLink>,
}

impl ApplyOutcome {
    pub fn merge(&mut self, other: ApplyOutcome) {
        self.created_nodes.extend(other.created_nodes);
        self.created_links.extend(other.created_links);
    }

    /// Notes created by the batch, in creation order.
    pub fn created_notes(&self) -> impl Iterator<Item = &GraphNode> {
        self.created_nodes.iter().filter(|node| node.kind() == NodeKind::Note)
    }
}
