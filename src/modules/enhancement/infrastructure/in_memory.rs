/// In-memory adapters for the record store and cache ports
///
/// Used when the host application has no persistence wired in yet, and by
/// the integration tests.
use crate::modules::enhancement::domain::{CacheInvalidator, EnhancementStep, RecordStore};
use crate::shared::errors::AppResult;
use crate::log_debug;
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashSet;

/// Tracks which enriched fields each record already has
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    fields: DashMap<String, HashSet<EnhancementStep>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a step's field as present on a record
    pub fn set_field(&self, record_id: &str, step: EnhancementStep) {
        self.fields
            .entry(record_id.to_string())
            .or_default()
            .insert(step);
    }

    pub fn clear_field(&self, record_id: &str, step: EnhancementStep) {
        if let Some(mut steps) = self.fields.get_mut(record_id) {
            steps.remove(&step);
        }
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn has_field(&self, record_id: &str, step: EnhancementStep) -> AppResult<bool> {
        Ok(self
            .fields
            .get(record_id)
            .map(|steps| steps.contains(&step))
            .unwrap_or(false))
    }
}

/// Cache port that only logs; for hosts without a downstream cache
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingCacheInvalidator;

#[async_trait]
impl CacheInvalidator for LoggingCacheInvalidator {
    async fn invalidate(&self, record_id: &str) -> AppResult<()> {
        log_debug!("Cache invalidation requested for {}", record_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_record_store_tracks_fields() {
        let store = InMemoryRecordStore::new();
        assert!(!store.has_field("opp-1", EnhancementStep::Naics).await.unwrap());

        store.set_field("opp-1", EnhancementStep::Naics);
        assert!(store.has_field("opp-1", EnhancementStep::Naics).await.unwrap());
        assert!(!store.has_field("opp-1", EnhancementStep::Title).await.unwrap());
        assert!(!store.has_field("opp-2", EnhancementStep::Naics).await.unwrap());

        store.clear_field("opp-1", EnhancementStep::Naics);
        assert!(!store.has_field("opp-1", EnhancementStep::Naics).await.unwrap());
    }
}
