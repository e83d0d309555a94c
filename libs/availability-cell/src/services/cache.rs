use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use tracing::debug;

use crate::models::DayAvailability;

type CacheKey = (String, NaiveDate);

struct CacheEntry {
    value: DayAvailability,
    inserted_at: Instant,
}

/// Bounded, TTL-based availability cache keyed by (calendar id, date),
/// scoped to this process. Booking creation invalidates the affected
/// calendar/day so freshly taken slots disappear immediately; other
/// entries simply age out.
#[derive(Clone)]
pub struct SlotCache {
    inner: Arc<RwLock<HashMap<CacheKey, CacheEntry>>>,
    ttl: Duration,
    capacity: usize,
}

impl SlotCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            ttl,
            capacity: capacity.max(1),
        }
    }

    pub fn get(&self, calendar_id: &str, date: NaiveDate) -> Option<DayAvailability> {
        let cache = self.inner.read().ok()?;
        let entry = cache.get(&(calendar_id.to_string(), date))?;
        if entry.inserted_at.elapsed() > self.ttl {
            return None;
        }
        Some(entry.value.clone())
    }

    pub fn insert(&self, calendar_id: &str, date: NaiveDate, value: DayAvailability) {
        let Ok(mut cache) = self.inner.write() else {
            return;
        };

        if cache.len() >= self.capacity {
            // Expired entries go first; if none, drop the oldest.
            let ttl = self.ttl;
            cache.retain(|_, entry| entry.inserted_at.elapsed() <= ttl);
            if cache.len() >= self.capacity {
                if let Some(oldest) = cache
                    .iter()
                    .min_by_key(|(_, entry)| entry.inserted_at)
                    .map(|(key, _)| key.clone())
                {
                    cache.remove(&oldest);
                }
            }
        }

        cache.insert(
            (calendar_id.to_string(), date),
            CacheEntry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn invalidate(&self, calendar_id: &str, date: NaiveDate) {
        if let Ok(mut cache) = self.inner.write() {
            if cache.remove(&(calendar_id.to_string(), date)).is_some() {
                debug!("Invalidated availability cache for {} on {}", calendar_id, date);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|cache| cache.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
