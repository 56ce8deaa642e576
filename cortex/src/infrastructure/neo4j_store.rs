// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Neo4j graph repository.
//!
//! Nodes are `(:CortexNode {id, kind, props, created_at, updated_at})` with
//! `props` holding the payload as a JSON string. Neo4j relationships are
//! directed, so a bidirectional link is written as two `:LINK` edges that
//! share one logical id; the reverse edge carries `mirror: true` and is
//! hidden from reads. Links whose endpoints do not exist are rejected.
//!
//! Every update runs as a single Cypher statement (or one transaction), so
//! each update is atomic on its own; a failing update stops the batch.

use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use neo4rs::{query, Graph, Query, Row};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::domain::{
    ApplyOutcome, CortexError, GraphLink, GraphNode, GraphOperation, GraphQueryResult, GraphStats,
    KnowledgeGraphUpdate, LinkData, LinkId, NodeId, NodeKind, NodePayload, Result, StrengthMode,
    LINK_INCREMENT,
};
use crate::infrastructure::repository::GraphRepository;

const NODE_COLUMNS: &str =
    "n.id AS id, n.kind AS kind, n.props AS props, n.created_at AS created_at, n.updated_at AS updated_at";

const LINK_COLUMNS: &str = "r.id AS id, a.id AS source, b.id AS target, r.relationship AS relationship, \
     r.strength AS strength, r.bidirectional AS bidirectional, r.created_at AS created_at, \
     r.updated_at AS updated_at";

fn backend<E: std::fmt::Display>(context: &'static str) -> impl FnOnce(E) -> CortexError {
    move |e| CortexError::Backend(format!("{}: {}", context, e))
}

/// Fixed-width UTC timestamps so Cypher string comparison orders by time.
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|at| at.with_timezone(&Utc))
        .map_err(backend("Invalid stored timestamp"))
}

fn column<T: DeserializeOwned>(row: &Row, key: &str) -> Result<T> {
    row.get::<T>(key)
        .map_err(|e| CortexError::Backend(format!("Failed to read column '{}': {}", key, e)))
}

fn row_to_node(row: &Row) -> Result<GraphNode> {
    let kind_name: String = column(row, "kind")?;
    let kind = NodeKind::parse(&kind_name)
        .ok_or_else(|| CortexError::Backend(format!("Unknown node kind: {}", kind_name)))?;
    let props: String = column(row, "props")?;
    let payload = NodePayload::from_properties(kind, serde_json::from_str(&props)?)?;

    Ok(GraphNode {
        id: NodeId(column(row, "id")?),
        payload,
        created_at: parse_timestamp(&column::<String>(row, "created_at")?)?,
        updated_at: parse_timestamp(&column::<String>(row, "updated_at")?)?,
    })
}

fn row_to_link(row: &Row) -> Result<GraphLink> {
    Ok(GraphLink {
        id: LinkId(column(row, "id")?),
        source: NodeId(column(row, "source")?),
        target: NodeId(column(row, "target")?),
        relationship: column(row, "relationship")?,
        strength: column(row, "strength")?,
        bidirectional: column(row, "bidirectional")?,
        created_at: parse_timestamp(&column::<String>(row, "created_at")?)?,
        updated_at: parse_timestamp(&column::<String>(row, "updated_at")?)?,
    })
}

pub struct Neo4jGraphRepository {
    graph: Graph,
}

impl Neo4jGraphRepository {
    pub async fn connect(uri: &str, user: &str, password: &str) -> Result<Self> {
        let graph = Graph::new(uri, user, password)
            .await
            .map_err(backend("Failed to connect to Neo4j"))?;
        info!(uri, "Connected to Neo4j");
        Ok(Self { graph })
    }

    /// Unique constraint on node ids; safe to call repeatedly.
    pub async fn initialize(&self) -> Result<()> {
        self.graph
            .run(query(
                "CREATE CONSTRAINT cortex_node_id IF NOT EXISTS FOR (n:CortexNode) REQUIRE n.id IS UNIQUE",
            ))
            .await
            .map_err(backend("Failed to create node constraint"))
    }

    async fn fetch<T>(&self, q: Query, map: impl Fn(&Row) -> Result<T>) -> Result<Vec<T>> {
        let mut stream = self
            .graph
            .execute(q)
            .await
            .map_err(backend("Neo4j query failed"))?;

        let mut out = Vec::new();
        while let Some(row) = stream.next().await.map_err(backend("Failed to read Neo4j row"))? {
            out.push(map(&row)?);
        }
        Ok(out)
    }

    async fn count(&self, cypher: &str) -> Result<usize> {
        let counts = self.fetch(query(cypher), |row| column::<i64>(row, "c")).await?;
        Ok(counts.first().copied().unwrap_or(0).max(0) as usize)
    }

    async fn node_exists(&self, id: &NodeId) -> Result<bool> {
        let rows = self
            .fetch(
                query("MATCH (n:CortexNode {id: $id}) RETURN n.id AS id").param("id", id.as_str()),
                |row| column::<String>(row, "id"),
            )
            .await?;
        Ok(!rows.is_empty())
    }

    async fn create_node(&self, node: GraphNode, outcome: &mut ApplyOutcome) -> Result<()> {
        self.graph
            .run(
                query(
                    "CREATE (n:CortexNode {id: $id, kind: $kind, props: $props, \
                     created_at: $created_at, updated_at: $updated_at})",
                )
                .param("id", node.id.as_str())
                .param("kind", node.kind().as_str())
                .param("props", node.properties().to_string())
                .param("created_at", timestamp(node.created_at))
                .param("updated_at", timestamp(node.updated_at)),
            )
            .await
            .map_err(backend("Failed to create node"))?;
        outcome.created_nodes.push(node);
        Ok(())
    }

    async fn create_link(&self, data: LinkData, outcome: &mut ApplyOutcome) -> Result<()> {
        let link = GraphLink::new(data.source, data.target, data.relationship, data.strength, data.bidirectional);
        let now = timestamp(link.created_at);

        let created = self
            .fetch(
                query(
                    "MATCH (a:CortexNode {id: $source}), (b:CortexNode {id: $target}) \
                     CREATE (a)-[r:LINK {id: $id, relationship: $relationship, strength: $strength, \
                        bidirectional: $bidirectional, mirror: false, created_at: $now, updated_at: $now}]->(b) \
                     FOREACH (_ IN CASE WHEN $bidirectional THEN [1] ELSE [] END | \
                        CREATE (b)-[:LINK {id: $id, relationship: $relationship, strength: $strength, \
                        bidirectional: true, mirror: true, created_at: $now, updated_at: $now}]->(a)) \
                     RETURN r.id AS id",
                )
                .param("source", link.source.as_str())
                .param("target", link.target.as_str())
                .param("id", link.id.as_str())
                .param("relationship", link.relationship.as_str())
                .param("strength", link.strength)
                .param("bidirectional", link.bidirectional)
                .param("now", now),
                |row| column::<String>(row, "id"),
            )
            .await?;

        if created.is_empty() {
            return Err(CortexError::Backend(format!(
                "Link {} -> {} references a node that does not exist",
                link.source, link.target
            )));
        }
        outcome.created_links.push(link);
        Ok(())
    }

    /// Sets the strength of the first `source -> target` link (and its
    /// mirror). `expr` is a Cypher expression over `m.strength`.
    async fn set_first_link_strength(&self, source: &NodeId, target: &NodeId, expr: &str, value: f64) -> Result<usize> {
        let cypher = format!(
            "MATCH (:CortexNode {{id: $source}})-[r:LINK {{mirror: false}}]->(:CortexNode {{id: $target}}) \
             WITH r LIMIT 1 \
             MATCH ()-[m:LINK {{id: r.id}}]->() \
             SET m.strength = {}, m.updated_at = $now \
             RETURN count(DISTINCT m.id) AS c",
            expr
        );
        let counts = self
            .fetch(
                query(&cypher)
                    .param("source", source.as_str())
                    .param("target", target.as_str())
                    .param("value", value)
                    .param("now", timestamp(Utc::now())),
                |row| column::<i64>(row, "c"),
            )
            .await?;
        Ok(counts.first().copied().unwrap_or(0).max(0) as usize)
    }

    async fn apply_operation(&self, operation: GraphOperation, outcome: &mut ApplyOutcome) -> Result<()> {
        match operation {
            GraphOperation::CreateNote(note) => {
                self.create_node(GraphNode::new(NodePayload::Note(note)), outcome).await
            }
            GraphOperation::CreateMetaPattern(payload) => {
                self.create_node(GraphNode::new(NodePayload::MetaPattern(payload)), outcome).await
            }
            GraphOperation::CreateLink(data) => self.create_link(data, outcome).await,
            GraphOperation::CreateTags { tags, note_id } => {
                for tag in tags.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
                    let tag_id = NodeId::for_tag(tag);
                    if !self.node_exists(&tag_id).await? {
                        let node = GraphNode::with_id(tag_id.clone(), NodePayload::Tag { name: tag.to_string() });
                        let now = timestamp(node.created_at);
                        self.graph
                            .run(
                                query(
                                    "MERGE (n:CortexNode {id: $id}) \
                                     ON CREATE SET n.kind = 'Tag', n.props = $props, \
                                        n.created_at = $now, n.updated_at = $now",
                                )
                                .param("id", tag_id.as_str())
                                .param("props", node.properties().to_string())
                                .param("now", now),
                            )
                            .await
                            .map_err(backend("Failed to merge tag"))?;
                        outcome.created_nodes.push(node);
                    }

                    if let Some(note_id) = &note_id {
                        let now = timestamp(Utc::now());
                        self.graph
                            .run(
                                query(
                                    "MATCH (a:CortexNode {id: $note}), (b:CortexNode {id: $tag}) \
                                     MERGE (a)-[r:LINK {relationship: 'tagged_with', mirror: false}]->(b) \
                                     ON CREATE SET r.id = $id, r.strength = 1.0, r.bidirectional = false, \
                                        r.created_at = $now, r.updated_at = $now",
                                )
                                .param("note", note_id.as_str())
                                .param("tag", tag_id.as_str())
                                .param("id", LinkId::new().as_str())
                                .param("now", now),
                            )
                            .await
                            .map_err(backend("Failed to link note to tag"))?;
                    }
                }
                Ok(())
            }
            GraphOperation::UpsertLearningPath { id, payload } => {
                let node = GraphNode::new(NodePayload::LearningPath(payload));
                let Some(id) = id else {
                    return self.create_node(node, outcome).await;
                };

                let now = timestamp(node.updated_at);
                let rows = self
                    .fetch(
                        query(
                            "MERGE (n:CortexNode {id: $id}) \
                             ON CREATE SET n.kind = 'LearningPath', n.props = $props, \
                                n.created_at = $now, n.updated_at = $now, n.fresh = true \
                             ON MATCH SET n.props = CASE WHEN n.kind = 'LearningPath' THEN $props ELSE n.props END, \
                                n.updated_at = CASE WHEN n.kind = 'LearningPath' THEN $now ELSE n.updated_at END \
                             WITH n, coalesce(n.fresh, false) AS created \
                             REMOVE n.fresh \
                             RETURN n.kind AS kind, created",
                        )
                        .param("id", id.as_str())
                        .param("props", node.properties().to_string())
                        .param("now", now),
                        |row| Ok((column::<String>(row, "kind")?, column::<bool>(row, "created")?)),
                    )
                    .await?;

                match rows.first() {
                    Some((kind, _)) if kind != NodeKind::LearningPath.as_str() => Err(CortexError::Validation(
                        format!("node {} is a {}, not a LearningPath", id, kind),
                    )),
                    Some((_, true)) => {
                        outcome.created_nodes.push(GraphNode { id, ..node });
                        Ok(())
                    }
                    _ => Ok(()),
                }
            }
            GraphOperation::SetLinkStrength { source, target, strength, mode } => {
                let expr = match mode {
                    StrengthMode::Replace => "$value",
                    StrengthMode::Max => "CASE WHEN $value > m.strength THEN $value ELSE m.strength END",
                };
                self.set_first_link_strength(&source, &target, expr, strength).await?;
                Ok(())
            }
            GraphOperation::DeleteLinks { source, target, relationship } => {
                self.graph
                    .run(
                        query(
                            "MATCH (:CortexNode {id: $source})-[r:LINK {mirror: false}]->(:CortexNode {id: $target}) \
                             WHERE $relationship = '' OR r.relationship = $relationship \
                             WITH collect(r.id) AS ids \
                             MATCH ()-[m:LINK]->() WHERE m.id IN ids \
                             DELETE m",
                        )
                        .param("source", source.as_str())
                        .param("target", target.as_str())
                        .param("relationship", relationship.unwrap_or_default()),
                    )
                    .await
                    .map_err(backend("Failed to delete links"))
            }
        }
    }
}

#[async_trait]
impl GraphRepository for Neo4jGraphRepository {
    async fn apply_updates(&self, updates: &[KnowledgeGraphUpdate]) -> Result<ApplyOutcome> {
        let mut outcome = ApplyOutcome::default();
        for (index, update) in updates.iter().enumerate() {
            let operation = update.operation()?;
            debug!(index, update_type = %update.update_type(), action = %update.action, "Applying graph update");
            self.apply_operation(operation, &mut outcome).await?;
        }
        info!(updates = updates.len(), created_nodes = outcome.created_nodes.len(), "Applied graph update batch");
        Ok(outcome)
    }

    async fn query(&self, topic: &str) -> Result<GraphQueryResult> {
        let nodes = self
            .fetch(
                query(&format!(
                    "MATCH (n:CortexNode) WHERE toLower(n.props) CONTAINS $topic \
                     RETURN {} ORDER BY n.created_at",
                    NODE_COLUMNS
                ))
                .param("topic", topic.to_lowercase()),
                row_to_node,
            )
            .await?;

        let ids: Vec<String> = nodes.iter().map(|node| node.id.0.clone()).collect();
        let links = if ids.is_empty() {
            Vec::new()
        } else {
            self.fetch(
                query(&format!(
                    "MATCH (a:CortexNode)-[r:LINK {{mirror: false}}]->(b:CortexNode) \
                     WHERE a.id IN $ids OR b.id IN $ids \
                     RETURN {} ORDER BY r.created_at",
                    LINK_COLUMNS
                ))
                .param("ids", ids),
                row_to_link,
            )
            .await?
        };

        Ok(GraphQueryResult { nodes, links })
    }

    async fn query_weak_links(&self, days: Option<u32>, threshold: f64) -> Result<Vec<GraphLink>> {
        // Empty cutoff sorts before every timestamp
        let cutoff = days
            .map(|d| timestamp(Utc::now() - Duration::days(i64::from(d))))
            .unwrap_or_default();

        self.fetch(
            query(&format!(
                "MATCH (a:CortexNode)-[r:LINK {{mirror: false}}]->(b:CortexNode) \
                 WHERE r.strength < $threshold AND r.updated_at >= $cutoff \
                 RETURN {} ORDER BY r.created_at",
                LINK_COLUMNS
            ))
            .param("threshold", threshold)
            .param("cutoff", cutoff),
            row_to_link,
        )
        .await
    }

    async fn increment_link_weight(&self, source: &NodeId, target: &NodeId) -> Result<bool> {
        let touched = self
            .set_first_link_strength(
                source,
                target,
                "CASE WHEN m.strength + $value > 1.0 THEN 1.0 ELSE m.strength + $value END",
                LINK_INCREMENT,
            )
            .await?;
        Ok(touched > 0)
    }

    async fn increment_link_weights(&self, pairs: &[(NodeId, NodeId)]) -> Result<usize> {
        let mut touched = 0;
        for (source, target) in pairs {
            if self.increment_link_weight(source, target).await? {
                touched += 1;
            }
        }
        Ok(touched)
    }

    async fn remove_link(&self, id: &LinkId) -> Result<()> {
        self.graph
            .run(query("MATCH ()-[r:LINK {id: $id}]->() DELETE r").param("id", id.as_str()))
            .await
            .map_err(backend("Failed to remove link"))
    }

    async fn get_node(&self, id: &NodeId) -> Result<Option<GraphNode>> {
        let nodes = self
            .fetch(
                query(&format!("MATCH (n:CortexNode {{id: $id}}) RETURN {}", NODE_COLUMNS)).param("id", id.as_str()),
                row_to_node,
            )
            .await?;
        Ok(nodes.into_iter().next())
    }

    async fn nodes_of_kind(&self, kind: NodeKind) -> Result<Vec<GraphNode>> {
        self.fetch(
            query(&format!(
                "MATCH (n:CortexNode {{kind: $kind}}) RETURN {} ORDER BY n.created_at",
                NODE_COLUMNS
            ))
            .param("kind", kind.as_str()),
            row_to_node,
        )
        .await
    }

    async fn stats(&self) -> Result<GraphStats> {
        Ok(GraphStats {
            node_count: self.count("MATCH (n:CortexNode) RETURN count(n) AS c").await?,
            link_count: self
                .count("MATCH ()-[r:LINK {mirror: false}]->() RETURN count(r) AS c")
                .await?,
        })
    }
}
