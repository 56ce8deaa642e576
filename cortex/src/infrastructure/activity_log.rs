// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// In-memory activity log: records note accesses for the consolidation scheduler.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::{ActivityRecord, NodeId, Result};
use crate::infrastructure::repository::ActivitySource;

#[derive(Clone, Default)]
pub struct InMemoryActivityLog {
    records: Arc<RwLock<Vec<ActivityRecord>>>,
}

impl InMemoryActivityLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, note_id: impl Into<NodeId>) {
        self.record_at(note_id, Utc::now()).await;
    }

    pub async fn record_at(&self, note_id: impl Into<NodeId>, timestamp: DateTime<Utc>) {
        self.records
            .write()
            .await
            .push(ActivityRecord::new(note_id, timestamp));
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl ActivitySource for InMemoryActivityLog {
    async fn activities_since(&self, since: DateTime<Utc>) -> Result<Vec<ActivityRecord>> {
        let records = self.records.read().await;
        let mut recent: Vec<ActivityRecord> = records
            .iter()
            .filter(|record| record.timestamp >= since)
            .cloned()
            .collect();
        // Records may be backfilled out of order
        recent.sort_by_key(|record| record.timestamp);
        Ok(recent)
    }

    async fn expire_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|record| record.timestamp >= cutoff);
        Ok(before - records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn test_activities_since_filters_and_sorts() {
        let log = InMemoryActivityLog::new();
        let now = Utc::now();
        log.record_at("old", now - Duration::hours(3)).await;
        log.record_at("b", now - Duration::minutes(2)).await;
        log.record_at("a", now - Duration::minutes(5)).await;

        let recent = log.activities_since(now - Duration::hours(1)).await.unwrap();
        let ids: Vec<&str> = recent.iter().map(|r| r.note_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_expire_before() {
        let log = InMemoryActivityLog::new();
        let now = Utc::now();
        log.record_at("old", now - Duration::days(2)).await;
        log.record("new").await;

        assert_eq!(log.expire_before(now - Duration::days(1)).await.unwrap(), 1);
        assert_eq!(log.len().await, 1);
        assert!(!log.is_empty().await);
    }
}
