//! Starred symbols and their frozen snapshots.

use crate::models::{MetricRow, StarredEntry, Symbol};
use crate::storage::{STARRED_KEY, Storage, StorageExt, Stored};
use std::sync::{Arc, Mutex, MutexGuard};

/// The user's pinned symbols, persisted independently of every list.
pub struct StarredStore {
    storage: Arc<dyn Storage>,
    entries: Mutex<Vec<StarredEntry>>,
}

impl StarredStore {
    /// Open the store, reading whatever is persisted.
    pub fn load(storage: Arc<dyn Storage>) -> Self {
        let entries = match storage.read::<Vec<StarredEntry>>(STARRED_KEY) {
            Stored::Loaded(entries) => dedupe(entries),
            Stored::Missing => Vec::new(),
            Stored::Corrupt(reason) => {
                tracing::warn!(%reason, "starred entries unreadable; starting empty");
                Vec::new()
            }
        };
        Self {
            storage,
            entries: Mutex::new(entries),
        }
    }

    pub fn entries(&self) -> Vec<StarredEntry> {
        self.lock().clone()
    }

    /// Entries rendered as rows; bare entries have no metrics.
    pub fn rows(&self) -> Vec<MetricRow> {
        self.lock().iter().map(StarredEntry::to_row).collect()
    }

    pub fn is_starred(&self, symbol: &Symbol) -> bool {
        self.lock().iter().any(|e| e.symbol() == symbol)
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Star or unstar `symbol`. Returns whether it is starred afterwards.
    ///
    /// A supplied snapshot is copied, so later changes to the source row
    /// do not leak into the starred entry.
    pub fn toggle(&self, symbol: &Symbol, snapshot: Option<&MetricRow>) -> bool {
        let mut entries = self.lock();
        let now_starred = if let Some(pos) = entries.iter().position(|e| e.symbol() == symbol) {
            entries.remove(pos);
            false
        } else {
            let entry = match snapshot {
                Some(row) => StarredEntry::Snapshot(MetricRow {
                    symbol: symbol.clone(),
                    ..row.clone()
                }),
                None => StarredEntry::Bare(symbol.clone()),
            };
            entries.push(entry);
            true
        };
        self.persist(&entries);
        tracing::info!(%symbol, now_starred, "toggled star");
        now_starred
    }

    /// Refresh frozen snapshots from rows some list just fetched.
    ///
    /// Returns the number of entries updated.
    pub fn absorb(&self, rows: &[MetricRow]) -> usize {
        let mut entries = self.lock();
        let mut updated = 0;
        for entry in entries.iter_mut() {
            if let Some(row) = rows.iter().find(|r| &r.symbol == entry.symbol()) {
                let mut fresh = row.clone();
                if fresh.curve_shape.is_none() {
                    if let StarredEntry::Snapshot(old) = entry {
                        fresh.curve_shape = old.curve_shape.clone();
                    }
                }
                if *entry != StarredEntry::Snapshot(fresh.clone()) {
                    *entry = StarredEntry::Snapshot(fresh);
                    updated += 1;
                }
            }
        }
        if updated > 0 {
            self.persist(&entries);
        }
        updated
    }

    /// Replace every entry, used by seeding.
    pub fn replace(&self, entries: Vec<StarredEntry>) {
        let mut current = self.lock();
        *current = dedupe(entries);
        self.persist(&current);
    }

    fn persist(&self, entries: &[StarredEntry]) {
        if let Err(e) = self.storage.write(STARRED_KEY, entries) {
            tracing::warn!(error = %e, "failed to persist starred entries");
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<StarredEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn dedupe(entries: Vec<StarredEntry>) -> Vec<StarredEntry> {
    let mut out: Vec<StarredEntry> = Vec::with_capacity(entries.len());
    for entry in entries {
        if !out.iter().any(|e| e.symbol() == entry.symbol()) {
            out.push(entry);
        }
    }
    out
}
