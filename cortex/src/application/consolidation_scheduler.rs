// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Consolidation Scheduler - Background task for periodic consolidation
//!
//! Runs the consolidation engine over a sliding window of recent activity and
//! optionally prunes links that stayed weak.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Periodic "sleep cycle" for the knowledge graph

use chrono::{Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::consolidation::ConsolidationEngine;
use crate::domain::{ConsolidationResult, ConsolidationSettings, CortexEvent, Result};
use crate::infrastructure::event_bus::{publish_or_warn, EventBus};
use crate::infrastructure::repository::{ActivitySource, GraphRepository};

/// Configuration for the consolidation scheduler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsolidationSchedulerConfig {
    /// Whether the background task runs at all
    pub enabled: bool,

    /// How often to run a cycle (in seconds)
    pub interval_seconds: u64,

    /// How much activity history each cycle looks at (in hours)
    pub lookback_hours: i64,

    /// Links weaker than this are removed after each cycle; `None` disables pruning
    pub prune_threshold: Option<f64>,

    /// Only prune links touched within this many days
    pub prune_after_days: Option<u32>,
}

impl Default for ConsolidationSchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_seconds: 3600,
            lookback_hours: 24,
            prune_threshold: None,
            prune_after_days: None,
        }
    }
}

impl From<&ConsolidationSettings> for ConsolidationSchedulerConfig {
    fn from(settings: &ConsolidationSettings) -> Self {
        Self {
            enabled: settings.enabled,
            interval_seconds: settings.interval_seconds,
            lookback_hours: settings.lookback_hours,
            prune_threshold: settings.prune_threshold,
            prune_after_days: settings.prune_after_days,
        }
    }
}

/// Outcome of one scheduler cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub consolidation: ConsolidationResult,
    pub links_pruned: usize,
    /// Activity records dropped for falling outside the lookback window
    pub activities_expired: usize,
}

pub struct ConsolidationScheduler {
    engine: Arc<ConsolidationEngine>,
    graph: Arc<dyn GraphRepository>,
    activities: Arc<dyn ActivitySource>,
    event_bus: Arc<dyn EventBus>,
    config: ConsolidationSchedulerConfig,
    shutdown_token: CancellationToken,
}

impl ConsolidationScheduler {
    pub fn new(
        engine: Arc<ConsolidationEngine>,
        graph: Arc<dyn GraphRepository>,
        activities: Arc<dyn ActivitySource>,
        event_bus: Arc<dyn EventBus>,
        config: ConsolidationSchedulerConfig,
    ) -> Self {
        Self {
            engine,
            graph,
            activities,
            event_bus,
            config,
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Cancelling this token stops the loop between cycles
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&self) {
        if !self.config.enabled {
            info!("Consolidation scheduler is disabled");
            return;
        }

        info!(
            interval_seconds = self.config.interval_seconds,
            lookback_hours = self.config.lookback_hours,
            prune_threshold = ?self.config.prune_threshold,
            "Starting consolidation scheduler"
        );

        let mut tick = interval(Duration::from_secs(self.config.interval_seconds.max(1)));

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    debug!("Running consolidation cycle");

                    match self.run_cycle().await {
                        Ok(report) => {
                            info!(
                                patterns_found = report.consolidation.patterns_found,
                                links_strengthened = report.consolidation.links_strengthened,
                                links_pruned = report.links_pruned,
                                activities_expired = report.activities_expired,
                                "Consolidation cycle completed"
                            );
                        }
                        Err(e) => {
                            warn!("Consolidation cycle failed: {}", e);
                        }
                    }
                }
                _ = self.shutdown_token.cancelled() => {
                    info!("Shutdown signal received, stopping consolidation scheduler");
                    break;
                }
            }
        }

        info!("Consolidation scheduler stopped");
    }

    /// Consolidate the lookback window, prune if configured, then expire
    /// activity that no later cycle will read.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let since = Utc::now() - ChronoDuration::hours(self.config.lookback_hours);
        let activities = self.activities.activities_since(since).await?;

        let consolidation = self.engine.consolidate(&activities).await?;
        let links_pruned = self.prune_weak_links().await?;
        let activities_expired = self.activities.expire_before(since).await?;

        Ok(CycleReport {
            consolidation,
            links_pruned,
            activities_expired,
        })
    }

    async fn prune_weak_links(&self) -> Result<usize> {
        let Some(threshold) = self.config.prune_threshold else {
            return Ok(0);
        };

        let weak = self
            .graph
            .query_weak_links(self.config.prune_after_days, threshold)
            .await?;

        for link in &weak {
            self.graph.remove_link(&link.id).await?;
            publish_or_warn(
                self.event_bus.as_ref(),
                CortexEvent::LinkPruned {
                    link_id: link.id.to_string(),
                    final_strength: link.strength,
                    timestamp: Utc::now(),
                },
            )
            .await;
        }

        if !weak.is_empty() {
            debug!(count = weak.len(), threshold, "Pruned weak links");
        }
        Ok(weak.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::consolidation::ConsolidationConfig;
    use crate::domain::{KnowledgeGraphUpdate, LinkData};
    use crate::infrastructure::activity_log::InMemoryActivityLog;
    use crate::infrastructure::event_bus::BroadcastEventBus;
    use crate::infrastructure::graph_store::InMemoryGraphRepository;

    fn link(source: &str, target: &str, strength: f64) -> KnowledgeGraphUpdate {
        KnowledgeGraphUpdate::create_link(LinkData {
            source: source.into(),
            target: target.into(),
            relationship: "related".to_string(),
            strength,
            bidirectional: false,
        })
    }

    fn scheduler(
        graph: Arc<InMemoryGraphRepository>,
        log: Arc<InMemoryActivityLog>,
        bus: Arc<BroadcastEventBus>,
        config: ConsolidationSchedulerConfig,
    ) -> ConsolidationScheduler {
        let engine = Arc::new(ConsolidationEngine::new(
            graph.clone(),
            bus.clone(),
            ConsolidationConfig::default(),
        ));
        ConsolidationScheduler::new(engine, graph, log, bus, config)
    }

    #[test]
    fn test_scheduler_configuration() {
        let config = ConsolidationSchedulerConfig::default();
        assert!(config.enabled);
        assert_eq!(config.interval_seconds, 3600);
        assert_eq!(config.lookback_hours, 24);
        assert_eq!(config.prune_threshold, None);
    }

    #[tokio::test]
    async fn test_cycle_consolidates_recent_activity() {
        let graph = Arc::new(InMemoryGraphRepository::new());
        graph.apply_updates(&[link("a", "b", 0.5)]).await.unwrap();
        let log = Arc::new(InMemoryActivityLog::new());
        let now = Utc::now();
        for minutes in [0, 20, 40] {
            log.record_at("a", now - ChronoDuration::minutes(minutes + 1)).await;
            log.record_at("b", now - ChronoDuration::minutes(minutes)).await;
        }
        // Outside the lookback window
        log.record_at("a", now - ChronoDuration::hours(48)).await;

        let scheduler = scheduler(
            graph.clone(),
            log.clone(),
            Arc::new(BroadcastEventBus::default()),
            ConsolidationSchedulerConfig::default(),
        );
        let report = scheduler.run_cycle().await.unwrap();

        assert_eq!(report.consolidation.patterns_found, 1);
        assert_eq!(report.consolidation.links_strengthened, 1);
        assert_eq!(report.links_pruned, 0);
        assert_eq!(report.activities_expired, 1);
        assert_eq!(log.len().await, 6);
    }

    #[tokio::test]
    async fn test_cycle_prunes_weak_links() {
        let graph = Arc::new(InMemoryGraphRepository::new());
        graph
            .apply_updates(&[link("a", "b", 0.05), link("a", "c", 0.9)])
            .await
            .unwrap();
        let bus = Arc::new(BroadcastEventBus::default());
        let mut events = bus.subscribe();

        let config = ConsolidationSchedulerConfig {
            prune_threshold: Some(0.1),
            ..Default::default()
        };
        let scheduler = scheduler(graph.clone(), Arc::new(InMemoryActivityLog::new()), bus, config);
        let report = scheduler.run_cycle().await.unwrap();

        assert_eq!(report.links_pruned, 1);
        assert_eq!(graph.stats().await.unwrap().link_count, 1);

        let mut pruned = 0;
        while let Ok(event) = events.try_recv() {
            if let CortexEvent::LinkPruned { final_strength, .. } = event {
                assert!((final_strength - 0.05).abs() < 1e-9);
                pruned += 1;
            }
        }
        assert_eq!(pruned, 1);
    }

    #[tokio::test]
    async fn test_scheduler_disabled() {
        let config = ConsolidationSchedulerConfig {
            enabled: false,
            ..Default::default()
        };
        let scheduler = Arc::new(scheduler(
            Arc::new(InMemoryGraphRepository::new()),
            Arc::new(InMemoryActivityLog::new()),
            Arc::new(BroadcastEventBus::default()),
            config,
        ));

        let handle = scheduler.start();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("disabled scheduler should return immediately")
            .unwrap();
    }

    #[tokio::test]
    async fn test_scheduler_stops_on_shutdown() {
        let scheduler = Arc::new(scheduler(
            Arc::new(InMemoryGraphRepository::new()),
            Arc::new(InMemoryActivityLog::new()),
            Arc::new(BroadcastEventBus::default()),
            ConsolidationSchedulerConfig::default(),
        ));
        let token = scheduler.shutdown_token();

        let handle = scheduler.start();
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("scheduler should stop after cancellation")
            .unwrap();
    }
}
