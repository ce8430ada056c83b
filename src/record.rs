//! The durable memory of the garbage collector: one [`ImageRecord`] per
//! image id currently known, held in [`ImageRecordStore`].

use std::collections::HashMap;
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;

/// Sentinel used for `firstDetected`/`lastUsed` before an image has ever
/// been observed in use, or before the very first detection scan has run.
/// Callers must treat the delta from this value as effectively infinite
/// (see `elapsed_since`), not as a real point in time.
pub const ZERO_TIME: SystemTime = SystemTime::UNIX_EPOCH;

/// Returns `now - origin`, treating `origin == ZERO_TIME` as "known since
/// forever" so that any `minAge`/`maxAge` comparison against it passes.
/// Also saturates instead of panicking if `now` ever precedes `origin`,
/// which can happen transiently with an injected test clock.
pub fn elapsed_since(origin: SystemTime, now: SystemTime) -> Duration {
    if origin == ZERO_TIME {
        return Duration::MAX;
    }
    now.duration_since(origin).unwrap_or(Duration::ZERO)
}

/// One image id's accounting state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRecord {
    pub id: String,
    pub first_detected: SystemTime,
    pub last_used: SystemTime,
    pub size: u64,
    pub pinned: bool,
}

impl ImageRecord {
    fn new(id: String, now: SystemTime, size: u64, pinned: bool) -> Self {
        ImageRecord {
            id,
            first_detected: now,
            last_used: ZERO_TIME,
            size,
            pinned,
        }
    }
}

/// Mapping from image id to [`ImageRecord`], guarded by a single lock.
///
/// Only the [`crate::detector::Detector`] and the free-space engine mutate
/// this store; the controller serializes the two. Critical sections here
/// are map operations only, never a network or filesystem call: the lock
/// must never be held across a runtime call.
#[derive(Default)]
pub struct ImageRecordStore {
    inner: Mutex<HashMap<String, ImageRecord>>,
}

impl ImageRecordStore {
    pub fn new() -> Self {
        ImageRecordStore::default()
    }

    /// Insert-or-update a record for `id`, observed at `now` with the given
    /// size/pinned values. Returns true if this used to be in use (i.e.
    /// `lastUsed` was bumped to `now`).
    pub fn upsert_seen(&self, id: &str, now: SystemTime, size: u64, pinned: bool, in_use: bool) {
        let mut guard = self.inner.lock();
        let record = guard
            .entry(id.to_owned())
            .or_insert_with(|| ImageRecord::new(id.to_owned(), now, size, pinned));
        record.size = size;
        record.pinned = pinned;
        if in_use {
            record.last_used = now;
        }
    }

    /// Remove every record whose id is not in `current_ids`. Returns the
    /// ids that were dropped.
    pub fn retain_only(&self, current_ids: &std::collections::HashSet<String>) -> Vec<String> {
        let mut guard = self.inner.lock();
        let removed: Vec<String> = guard
            .keys()
            .filter(|id| !current_ids.contains(id.as_str()))
            .cloned()
            .collect();
        for id in &removed {
            guard.remove(id);
        }
        removed
    }

    /// Snapshot every record currently in the store.
    pub fn snapshot(&self) -> Vec<ImageRecord> {
        self.inner.lock().values().cloned().collect()
    }

    /// Remove a single record, e.g. after a successful delete.
    pub fn remove(&self, id: &str) -> Option<ImageRecord> {
        self.inner.lock().remove(id)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up a single record. Presence is checked before any snapshot is
    /// taken, so there is no window where an absent id is dereferenced.
    pub fn get(&self, id: &str) -> Option<ImageRecord> {
        let guard = self.inner.lock();
        guard.get(id).cloned()
    }
}
