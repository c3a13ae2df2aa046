//! In-process implementations of every store trait.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::config::AutoApplyConfig;
use crate::models::cycle::CycleRecord;
use crate::models::queue::{QueueItem, QueueResolution};
use crate::store::{
    ArtifactStore, ConfigStore, CounterKey, CounterStore, CycleStore, DuplicateIndex,
    DuplicateOutcome, QueueStore, StoreError, Window,
};

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Unavailable("in-memory store lock poisoned".to_string())
}

#[derive(Default)]
pub struct MemoryConfigStore {
    configs: Mutex<HashMap<Uuid, AutoApplyConfig>>,
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn get(&self, user_id: Uuid) -> Result<Option<AutoApplyConfig>, StoreError> {
        Ok(self.configs.lock().map_err(poisoned)?.get(&user_id).cloned())
    }

    async fn upsert(&self, config: &AutoApplyConfig) -> Result<(), StoreError> {
        self.configs
            .lock()
            .map_err(poisoned)?
            .insert(config.user_id, config.clone());
        Ok(())
    }

    async fn list_active(&self) -> Result<Vec<AutoApplyConfig>, StoreError> {
        let mut active: Vec<_> = self
            .configs
            .lock()
            .map_err(poisoned)?
            .values()
            .filter(|c| c.is_active)
            .cloned()
            .collect();
        active.sort_by_key(|c| c.created_at);
        Ok(active)
    }
}

#[derive(Default)]
pub struct MemoryCycleStore {
    cycles: Mutex<Vec<CycleRecord>>,
}

#[async_trait]
impl CycleStore for MemoryCycleStore {
    async fn insert(&self, record: &CycleRecord) -> Result<(), StoreError> {
        let mut cycles = self.cycles.lock().map_err(poisoned)?;
        if cycles.iter().any(|c| c.cycle_id == record.cycle_id) {
            return Err(StoreError::Conflict(format!("cycle {} exists", record.cycle_id)));
        }
        cycles.push(record.clone());
        Ok(())
    }

    async fn update(&self, record: &CycleRecord) -> Result<(), StoreError> {
        let mut cycles = self.cycles.lock().map_err(poisoned)?;
        let slot = cycles
            .iter_mut()
            .find(|c| c.cycle_id == record.cycle_id)
            .ok_or_else(|| StoreError::NotFound(format!("cycle {}", record.cycle_id)))?;
        *slot = record.clone();
        Ok(())
    }

    async fn get(&self, user_id: Uuid, cycle_id: Uuid) -> Result<Option<CycleRecord>, StoreError> {
        Ok(self
            .cycles
            .lock()
            .map_err(poisoned)?
            .iter()
            .find(|c| c.cycle_id == cycle_id && c.user_id == user_id)
            .cloned())
    }

    async fn latest(&self, user_id: Uuid) -> Result<Option<CycleRecord>, StoreError> {
        Ok(self.list(user_id, 1).await?.into_iter().next())
    }

    async fn list(&self, user_id: Uuid, limit: u32) -> Result<Vec<CycleRecord>, StoreError> {
        let cycles = self.cycles.lock().map_err(poisoned)?;
        // Insertion order breaks ties between cycles started in the same instant.
        let mut mine: Vec<(usize, &CycleRecord)> = cycles
            .iter()
            .enumerate()
            .filter(|(_, c)| c.user_id == user_id)
            .collect();
        mine.sort_by(|a, b| b.1.cycle_start.cmp(&a.1.cycle_start).then(b.0.cmp(&a.0)));
        Ok(mine
            .into_iter()
            .take(limit as usize)
            .map(|(_, c)| c.clone())
            .collect())
    }
}

#[derive(Default)]
pub struct MemoryQueueStore {
    items: Mutex<Vec<QueueItem>>,
}

#[async_trait]
impl QueueStore for MemoryQueueStore {
    async fn insert(&self, item: &QueueItem) -> Result<(), StoreError> {
        self.items.lock().map_err(poisoned)?.push(item.clone());
        Ok(())
    }

    async fn list_pending(&self, user_id: Uuid) -> Result<Vec<QueueItem>, StoreError> {
        let mut pending: Vec<_> = self
            .items
            .lock()
            .map_err(poisoned)?
            .iter()
            .filter(|i| i.user_id == user_id && i.is_pending())
            .cloned()
            .collect();
        // stable: equal timestamps keep insertion order
        pending.sort_by_key(|i| i.queued_at);
        Ok(pending)
    }

    async fn resolve(
        &self,
        user_id: Uuid,
        item_id: Uuid,
        resolution: QueueResolution,
        at: DateTime<Utc>,
    ) -> Result<QueueItem, StoreError> {
        let mut items = self.items.lock().map_err(poisoned)?;
        let item = items
            .iter_mut()
            .find(|i| i.id == item_id && i.user_id == user_id)
            .ok_or_else(|| StoreError::NotFound(format!("queue item {item_id}")))?;
        if !item.is_pending() {
            return Err(StoreError::Conflict(format!(
                "queue item {item_id} already resolved"
            )));
        }
        item.resolution = Some(resolution);
        item.resolved_at = Some(at);
        Ok(item.clone())
    }
}

#[derive(Debug, Clone, Copy)]
struct RateLimitCounter {
    count: u32,
    window_start: DateTime<Utc>,
}

/// Fixed-window counters reset lazily on the first access after expiry.
#[derive(Default)]
pub struct MemoryCounterStore {
    counters: Mutex<HashMap<String, RateLimitCounter>>,
}

impl MemoryCounterStore {
    #[cfg(test)]
    pub fn count(&self, key: &str) -> u32 {
        self.counters
            .lock()
            .map(|c| c.get(key).map(|c| c.count).unwrap_or(0))
            .unwrap_or(0)
    }
}

fn current(counter: Option<&RateLimitCounter>, key: &CounterKey) -> u32 {
    match counter {
        Some(c) if c.window_start + key.window.duration() > key.window_start => c.count,
        _ => 0,
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn try_increment(&self, keys: &[CounterKey]) -> Result<Option<usize>, StoreError> {
        let mut counters = self.counters.lock().map_err(poisoned)?;

        for (i, key) in keys.iter().enumerate() {
            if current(counters.get(&key.key), key) >= key.ceiling {
                return Ok(Some(i));
            }
        }

        for key in keys {
            let entry = counters.entry(key.key.clone()).or_insert(RateLimitCounter {
                count: 0,
                window_start: key.window_start,
            });
            if entry.window_start + key.window.duration() <= key.window_start {
                entry.count = 0;
                entry.window_start = key.window_start;
            }
            entry.count += 1;
        }
        Ok(None)
    }
}

#[derive(Debug, Clone, Copy)]
struct DuplicateEntry {
    outcome: DuplicateOutcome,
    claimed_at: DateTime<Utc>,
}

/// Claims expire when the UTC day they were made in ends.
#[derive(Default)]
pub struct MemoryDuplicateIndex {
    entries: Mutex<HashMap<(Uuid, String), DuplicateEntry>>,
}

impl MemoryDuplicateIndex {
    #[cfg(test)]
    pub fn outcome(&self, user_id: Uuid, key: &str) -> Option<DuplicateOutcome> {
        self.entries
            .lock()
            .ok()?
            .get(&(user_id, key.to_string()))
            .map(|e| e.outcome)
    }
}

fn live(entry: &DuplicateEntry, now: DateTime<Utc>) -> bool {
    Window::Day.truncate(entry.claimed_at) == Window::Day.truncate(now)
}

#[async_trait]
impl DuplicateIndex for MemoryDuplicateIndex {
    async fn contains(&self, user_id: Uuid, key: &str, now: DateTime<Utc>) -> Result<bool, StoreError> {
        Ok(self
            .entries
            .lock()
            .map_err(poisoned)?
            .get(&(user_id, key.to_string()))
            .is_some_and(|e| live(e, now)))
    }

    async fn claim(&self, user_id: Uuid, key: &str, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let mut entries = self.entries.lock().map_err(poisoned)?;
        let slot = (user_id, key.to_string());
        if entries.get(&slot).is_some_and(|e| live(e, now)) {
            return Ok(false);
        }
        entries.insert(
            slot,
            DuplicateEntry {
                outcome: DuplicateOutcome::Claimed,
                claimed_at: now,
            },
        );
        Ok(true)
    }

    async fn record(
        &self,
        user_id: Uuid,
        key: &str,
        outcome: DuplicateOutcome,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().map_err(poisoned)?;
        match entries.get_mut(&(user_id, key.to_string())) {
            Some(entry) if live(entry, now) => {
                entry.outcome = outcome;
                Ok(())
            }
            _ => Err(StoreError::NotFound(format!("no live claim for '{key}'"))),
        }
    }
}

#[derive(Default)]
pub struct MemoryArtifactStore {
    artifacts: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryArtifactStore {
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.artifacts.lock().map(|a| a.len()).unwrap_or(0)
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn put_screenshot(
        &self,
        user_id: Uuid,
        cycle_id: Uuid,
        label: &str,
        png: Vec<u8>,
    ) -> Result<String, StoreError> {
        let key = format!("memory://screenshots/{user_id}/{cycle_id}/{label}.png");
        self.artifacts
            .lock()
            .map_err(poisoned)?
            .insert(key.clone(), png);
        Ok(key)
    }
}
