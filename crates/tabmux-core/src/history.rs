//! Command history captured from completed input lines.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Duration, Local, Utc};
use serde::{Deserialize, Serialize};

/// One recorded command.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: String,
    pub command: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub pinned: bool,
}

impl HistoryEntry {
    /// Build an entry stamped now. Returns `None` for a blank command.
    pub fn new(command: &str) -> Option<Self> {
        Self::at(command, Utc::now())
    }

    pub fn at(command: &str, timestamp: DateTime<Utc>) -> Option<Self> {
        let command = command.trim();
        if command.is_empty() {
            return None;
        }
        Some(Self {
            id: uuid::Uuid::new_v4().to_string(),
            command: command.to_string(),
            timestamp,
            pinned: false,
        })
    }
}

/// Where completed commands are recorded.
pub trait HistoryStore: Send + Sync {
    fn append(&self, entry: HistoryEntry);

    /// All entries, newest first.
    fn list(&self) -> Vec<HistoryEntry>;

    /// Flip an entry's pinned flag. Returns the new value, or `None` if absent.
    fn toggle_pin(&self, id: &str) -> Option<bool>;

    /// Remove one entry. Returns whether it existed.
    fn remove(&self, id: &str) -> bool;

    fn clear(&self);

    /// Cap the number of entries kept. Stores without a cap ignore this.
    fn set_limit(&self, _limit: usize) {}
}

/// Entries falling on the same relative day.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HistoryGroup {
    pub label: &'static str,
    pub items: Vec<HistoryEntry>,
}

const GROUP_LABELS: [&str; 4] = ["Today", "Yesterday", "Last 7 Days", "Older"];

/// Bucket entries by calendar day relative to `now`, in local time.
///
/// Empty groups are omitted; items within a group are newest first.
pub fn group_by_day(entries: &[HistoryEntry], now: DateTime<Local>) -> Vec<HistoryGroup> {
    let today = now.date_naive();
    let yesterday = today - Duration::days(1);
    let last_week = today - Duration::days(7);

    let mut buckets: [Vec<HistoryEntry>; 4] = Default::default();
    for entry in entries {
        let day = entry.timestamp.with_timezone(&Local).date_naive();
        let bucket = if day == today {
            0
        } else if day == yesterday {
            1
        } else if day > last_week {
            2
        } else {
            3
        };
        buckets[bucket].push(entry.clone());
    }

    GROUP_LABELS
        .into_iter()
        .zip(buckets)
        .filter(|(_, items)| !items.is_empty())
        .map(|(label, mut items)| {
            items.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
            HistoryGroup { label, items }
        })
        .collect()
}

/// In-memory history, newest entry first.
pub struct MemoryHistory {
    entries: Mutex<Vec<HistoryEntry>>,
    limit: AtomicUsize,
}

impl MemoryHistory {
    /// Create a store holding at most `limit` entries.
    pub fn new(limit: usize) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            limit: AtomicUsize::new(limit),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries whose command contains `query`, ignoring case.
    pub fn search(&self, query: &str) -> Vec<HistoryEntry> {
        let query = query.to_lowercase();
        self.list()
            .into_iter()
            .filter(|e| e.command.to_lowercase().contains(&query))
            .collect()
    }

    pub fn pinned(&self) -> Vec<HistoryEntry> {
        self.list().into_iter().filter(|e| e.pinned).collect()
    }
}

/// Drop the oldest unpinned entries until at most `limit` remain.
///
/// Pinned entries are never evicted, so a list of only pinned entries may
/// exceed the limit.
fn enforce_limit(entries: &mut Vec<HistoryEntry>, limit: usize) {
    while entries.len() > limit {
        match entries.iter().rposition(|e| !e.pinned) {
            Some(oldest) => {
                entries.remove(oldest);
            }
            None => break,
        }
    }
}

impl HistoryStore for MemoryHistory {
    fn append(&self, entry: HistoryEntry) {
        let limit = self.limit.load(Ordering::Relaxed);
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(0, entry);
            enforce_limit(&mut entries, limit);
        }
    }

    fn list(&self) -> Vec<HistoryEntry> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }

    fn toggle_pin(&self, id: &str) -> Option<bool> {
        let mut entries = self.entries.lock().ok()?;
        let entry = entries.iter_mut().find(|e| e.id == id)?;
        entry.pinned = !entry.pinned;
        Some(entry.pinned)
    }

    fn remove(&self, id: &str) -> bool {
        match self.entries.lock() {
            Ok(mut entries) => {
                let before = entries.len();
                entries.retain(|e| e.id != id);
                entries.len() != before
            }
            Err(_) => false,
        }
    }

    fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }

    fn set_limit(&self, limit: usize) {
        self.limit.store(limit, Ordering::Relaxed);
        if let Ok(mut entries) = self.entries.lock() {
            enforce_limit(&mut entries, limit);
        }
    }
}

impl Default for MemoryHistory {
    fn default() -> Self {
        Self::new(1000)
    }
}
