// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Consolidation Engine
//!
//! Mines an activity log for notes that are accessed close together in time,
//! reinforces the links between them and reports what it found.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Hebbian-style link reinforcement over co-access patterns
//!
//! Pattern extraction compares every pair of activities, which is quadratic
//! in the window size; a run covers roughly one day of personal activity.
//! Only the strengthening step touches the graph store.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use crate::domain::{
    ActivityRecord, ConsolidationResult, ConsolidationSettings, CortexEvent, NodeId, PatternMatch, Result,
};
use crate::infrastructure::event_bus::{publish_or_warn, EventBus};
use crate::infrastructure::repository::GraphRepository;

/// Tuning for pattern extraction and insight generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsolidationConfig {
    /// Two accesses closer than this co-occur (seconds)
    pub window_seconds: i64,

    /// Patterns must occur more often than this to reinforce a link
    pub min_frequency: u32,

    /// How recent a single co-occurrence must be to count as new (hours)
    pub new_connection_hours: i64,
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self {
            window_seconds: 300,
            min_frequency: 2,
            new_connection_hours: 24,
        }
    }
}

impl From<&ConsolidationSettings> for ConsolidationConfig {
    fn from(settings: &ConsolidationSettings) -> Self {
        Self {
            window_seconds: settings.window_seconds,
            min_frequency: settings.min_frequency,
            new_connection_hours: settings.new_connection_hours,
        }
    }
}

pub struct ConsolidationEngine {
    graph: Arc<dyn GraphRepository>,
    event_bus: Arc<dyn EventBus>,
    config: ConsolidationConfig,
}

impl ConsolidationEngine {
    pub fn new(
        graph: Arc<dyn GraphRepository>,
        event_bus: Arc<dyn EventBus>,
        config: ConsolidationConfig,
    ) -> Self {
        Self {
            graph,
            event_bus,
            config,
        }
    }

    pub fn config(&self) -> &ConsolidationConfig {
        &self.config
    }

    /// Count co-occurrences of note pairs accessed within the window.
    ///
    /// Pairs are keyed by their sorted note ids; accesses of the same note
    /// never pair with each other. Patterns come back in discovery order.
    pub fn extract_patterns(&self, activities: &[ActivityRecord]) -> Vec<PatternMatch> {
        let window_ms = Duration::seconds(self.config.window_seconds).num_milliseconds();
        let mut slots: HashMap<(NodeId, NodeId), usize> = HashMap::new();
        let mut patterns: Vec<PatternMatch> = Vec::new();

        for (i, first) in activities.iter().enumerate() {
            for second in &activities[i + 1..] {
                if first.note_id == second.note_id {
                    continue;
                }
                let delta_ms = (first.timestamp - second.timestamp).num_milliseconds().abs();
                if delta_ms >= window_ms {
                    continue;
                }

                let (source, target) = if first.note_id <= second.note_id {
                    (&first.note_id, &second.note_id)
                } else {
                    (&second.note_id, &first.note_id)
                };
                let later = first.timestamp.max(second.timestamp);

                match slots.get(&(source.clone(), target.clone())) {
                    Some(&slot) => {
                        let pattern = &mut patterns[slot];
                        pattern.frequency += 1;
                        pattern.last_accessed = pattern.last_accessed.max(later);
                    }
                    None => {
                        slots.insert((source.clone(), target.clone()), patterns.len());
                        patterns.push(PatternMatch {
                            source_note: source.clone(),
                            target_note: target.clone(),
                            frequency: 1,
                            last_accessed: later,
                        });
                    }
                }
            }
        }

        debug!(activities = activities.len(), patterns = patterns.len(), "Extracted co-access patterns");
        patterns
    }

    /// Reinforce the `source -> target` link of every frequent pattern.
    ///
    /// Returns how many links were touched. Patterns without an existing
    /// link are skipped; consolidation never creates links.
    pub async fn strengthen_links(&self, patterns: &[PatternMatch]) -> Result<usize> {
        let pairs: Vec<(NodeId, NodeId)> = patterns
            .iter()
            .filter(|pattern| pattern.frequency > self.config.min_frequency)
            .map(|pattern| (pattern.source_note.clone(), pattern.target_note.clone()))
            .collect();

        if pairs.is_empty() {
            return Ok(0);
        }

        let touched = self.graph.increment_link_weights(&pairs).await?;
        debug!(candidates = pairs.len(), touched, "Strengthened links");

        if touched > 0 {
            publish_or_warn(
                self.event_bus.as_ref(),
                CortexEvent::LinksStrengthened {
                    count: touched,
                    timestamp: Utc::now(),
                },
            )
            .await;
        }
        Ok(touched)
    }

    pub fn generate_insights(&self, patterns: &[PatternMatch]) -> Vec<String> {
        self.generate_insights_at(patterns, Utc::now())
    }

    /// Human-readable observations about the patterns, as of `now`.
    pub fn generate_insights_at(&self, patterns: &[PatternMatch], now: DateTime<Utc>) -> Vec<String> {
        let mut insights = Vec::new();

        // Summed frequency per note, in first-appearance order
        let mut totals: Vec<(&NodeId, u32)> = Vec::new();
        for pattern in patterns {
            for note in [&pattern.source_note, &pattern.target_note] {
                match totals.iter_mut().find(|(id, _)| *id == note) {
                    Some((_, total)) => *total += pattern.frequency,
                    None => totals.push((note, pattern.frequency)),
                }
            }
        }

        if totals.len() >= 3 {
            // Stable sort keeps first appearance ahead on ties
            totals.sort_by(|a, b| b.1.cmp(&a.1));
            let hubs: Vec<&str> = totals.iter().take(3).map(|(id, _)| id.as_str()).collect();
            insights.push(format!(
                "Your most connected notes right now are {}, {} and {}.",
                hubs[0], hubs[1], hubs[2]
            ));
        }

        let horizon = Duration::hours(self.config.new_connection_hours);
        let new_connections = patterns
            .iter()
            .filter(|pattern| pattern.frequency == 1 && now - pattern.last_accessed <= horizon)
            .count();
        if new_connections > 0 {
            insights.push(format!(
                "Discovered {} new connection{} between notes in the last {} hours.",
                new_connections,
                if new_connections == 1 { "" } else { "s" },
                self.config.new_connection_hours
            ));
        }

        insights
    }

    /// Extract, strengthen and report in one run. Any failure aborts the
    /// run; no partial result is returned.
    pub async fn consolidate(&self, activities: &[ActivityRecord]) -> Result<ConsolidationResult> {
        let started = Instant::now();

        let patterns = self.extract_patterns(activities);
        let links_strengthened = self.strengthen_links(&patterns).await?;
        let insights = self.generate_insights(&patterns);

        let result = ConsolidationResult {
            patterns_found: patterns.len(),
            links_strengthened,
            insights_generated: insights.len(),
            insights,
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        info!(
            patterns_found = result.patterns_found,
            links_strengthened = result.links_strengthened,
            insights_generated = result.insights_generated,
            duration_ms,
            "Consolidation completed"
        );
        publish_or_warn(
            self.event_bus.as_ref(),
            CortexEvent::ConsolidationCompleted {
                patterns_found: result.patterns_found,
                links_strengthened: result.links_strengthened,
                insights_generated: result.insights_generated,
                duration_ms,
                timestamp: Utc::now(),
            },
        )
        .await;

        Ok(result)
    }
}
