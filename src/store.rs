//! One named symbol list: membership, cached metrics and refresh logic.
//!
//! Membership is the source of truth for which symbols a list shows and in
//! what order. Metric rows are a replaceable snapshot layered on top; the
//! last good snapshot is persisted and reused as long as its symbol set
//! still matches the membership.

use crate::api::{QuoteSource, SourceError};
use crate::models::{ListId, MetricRow, SortDirection, SortKey, Symbol, sort_rows};
use crate::storage::{Storage, StorageExt, Stored, cache_key, membership_key};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tokio::sync::broadcast;

/// Errors returned by list refreshes.
#[derive(Debug, Error)]
pub enum ListError {
    #[error(transparent)]
    Source(#[from] SourceError),

    /// Membership changed while the request was in flight; result dropped.
    #[error("list changed during refresh")]
    Stale,

    #[error("no data returned for {0}")]
    NoData(Symbol),
}

/// Where a loaded membership came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOrigin {
    Persisted,
    Defaults,
    /// Persisted data was unreadable; defaults were used instead.
    Recovered,
}

/// State change notifications for the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub enum ListEvent {
    MembershipChanged(ListId),
    RowsReplaced(ListId),
    RefreshFailed(ListId, String),
}

/// Last successfully fetched rows for a list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheSnapshot {
    pub symbols: Vec<Symbol>,
    pub rows: Vec<MetricRow>,
    #[serde(default)]
    pub fetched_at: Option<DateTime<Utc>>,
}

impl CacheSnapshot {
    fn from_rows(rows: &[MetricRow]) -> Self {
        Self {
            symbols: rows.iter().map(|r| r.symbol.clone()).collect(),
            rows: rows.to_vec(),
            fetched_at: Some(Utc::now()),
        }
    }

    /// Valid for `membership` when both hold the same set of symbols.
    pub fn matches(&self, membership: &[Symbol]) -> bool {
        let cached: HashSet<&Symbol> = self.symbols.iter().collect();
        let current: HashSet<&Symbol> = membership.iter().collect();
        cached == current
    }

    /// Rows in `membership` order, all-null rows for anything missing.
    fn rows_in_order(&self, membership: &[Symbol]) -> Vec<MetricRow> {
        let by_symbol: HashMap<&Symbol, &MetricRow> =
            self.rows.iter().map(|r| (&r.symbol, r)).collect();
        membership
            .iter()
            .map(|s| {
                by_symbol
                    .get(s)
                    .map(|r| (*r).clone())
                    .unwrap_or_else(|| MetricRow::empty(s.clone()))
            })
            .collect()
    }
}

/// Static description of a list.
#[derive(Debug, Clone)]
pub struct ListSpec {
    pub id: ListId,
    pub defaults: Vec<Symbol>,
}

#[derive(Default)]
struct ListState {
    membership: Option<Vec<Symbol>>,
    rows: Vec<MetricRow>,
    generation: u64,
    fetched_at: Option<DateTime<Utc>>,
}

/// Membership, rows and cache reconciliation for one list.
pub struct SymbolListStore {
    spec: ListSpec,
    storage: Arc<dyn Storage>,
    source: Arc<dyn QuoteSource>,
    state: Mutex<ListState>,
    events: broadcast::Sender<ListEvent>,
}

impl SymbolListStore {
    pub fn new(spec: ListSpec, storage: Arc<dyn Storage>, source: Arc<dyn QuoteSource>) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            spec,
            storage,
            source,
            state: Mutex::new(ListState::default()),
            events,
        }
    }

    pub fn id(&self) -> ListId {
        self.spec.id
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ListEvent> {
        self.events.subscribe()
    }

    /// Read persisted membership, falling back to the list's defaults.
    ///
    /// Defaults are not written back; that happens on the first mutation.
    pub fn load(&self) -> (Vec<Symbol>, LoadOrigin) {
        let (membership, origin) = self.read_membership();
        self.lock().membership = Some(membership.clone());
        (membership, origin)
    }

    /// Current membership in display order.
    pub fn symbols(&self) -> Vec<Symbol> {
        let mut state = self.lock();
        self.ensure_loaded(&mut state).clone()
    }

    /// Current rows in membership order.
    pub fn rows(&self) -> Vec<MetricRow> {
        self.lock().rows.clone()
    }

    #[cfg(test)]
    pub fn contains(&self, symbol: &Symbol) -> bool {
        let mut state = self.lock();
        self.ensure_loaded(&mut state).contains(symbol)
    }

    /// When the displayed rows were fetched, if known.
    pub fn fetched_at(&self) -> Option<DateTime<Utc>> {
        self.lock().fetched_at
    }

    /// Rows ordered for display; stored order is untouched.
    pub fn sorted_view(&self, key: SortKey, direction: SortDirection) -> Vec<MetricRow> {
        sort_rows(&self.lock().rows, key, direction)
    }

    /// Append a symbol. Returns false for blank input, duplicates and
    /// server-determined lists. Does not fetch metrics.
    pub fn add(&self, raw: &str) -> bool {
        if self.spec.id.is_server_determined() {
            tracing::warn!(list = %self.spec.id, "list membership is server-determined; add ignored");
            return false;
        }
        let Some(symbol) = Symbol::parse(raw) else {
            return false;
        };

        {
            let mut state = self.lock();
            let membership = self.ensure_loaded(&mut state);
            if membership.contains(&symbol) {
                return false;
            }
            membership.push(symbol.clone());
            let snapshot = membership.clone();
            state.generation += 1;
            self.persist_membership(&snapshot);
        }

        tracing::info!(list = %self.spec.id, %symbol, "added symbol");
        self.emit(ListEvent::MembershipChanged(self.spec.id));
        true
    }

    /// Drop a symbol along with its row and cached entry. Returns whether
    /// anything was removed; server-determined lists refuse removal.
    pub fn remove(&self, symbol: &Symbol) -> bool {
        if self.spec.id.is_server_determined() {
            tracing::warn!(list = %self.spec.id, "list membership is server-determined; remove ignored");
            return false;
        }
        {
            let mut state = self.lock();
            let membership = self.ensure_loaded(&mut state);
            let before = membership.len();
            membership.retain(|s| s != symbol);
            if membership.len() == before {
                return false;
            }
            let remaining = membership.clone();
            state.rows.retain(|r| &r.symbol != symbol);
            state.generation += 1;
            self.persist_membership(&remaining);
            self.prune_cache(symbol, &remaining, &state.rows);
        }

        tracing::info!(list = %self.spec.id, %symbol, "removed symbol");
        self.emit(ListEvent::MembershipChanged(self.spec.id));
        true
    }

    /// Populate the list from imported data if nothing is persisted yet.
    ///
    /// Existing persisted membership is never overwritten.
    pub fn seed(&self, symbols: &[Symbol]) -> bool {
        if symbols.is_empty() || self.spec.id.is_server_determined() {
            return false;
        }
        if self.read_membership().1 == LoadOrigin::Persisted {
            return false;
        }

        let mut seen = HashSet::new();
        let seeded: Vec<Symbol> = symbols
            .iter()
            .filter(|s| seen.insert((*s).clone()))
            .cloned()
            .collect();
        {
            let mut state = self.lock();
            self.persist_membership(&seeded);
            state.membership = Some(seeded);
            state.rows.clear();
            state.generation += 1;
        }

        tracing::info!(list = %self.spec.id, "seeded membership");
        self.emit(ListEvent::MembershipChanged(self.spec.id));
        true
    }

    /// Show the persisted snapshot without touching the network.
    ///
    /// Returns false when there is no usable snapshot.
    pub fn restore_cached(&self) -> bool {
        let Some(snapshot) = self.read_cache() else {
            return false;
        };

        {
            let mut state = self.lock();
            let membership = self.ensure_loaded(&mut state).clone();
            let rows = if self.spec.id.is_server_determined() {
                snapshot.rows.clone()
            } else if snapshot.matches(&membership) {
                snapshot.rows_in_order(&membership)
            } else {
                return false;
            };
            state.rows = rows;
            state.fetched_at = snapshot.fetched_at;
        }

        self.emit(ListEvent::RowsReplaced(self.spec.id));
        true
    }

    /// Bring the whole list up to date.
    ///
    /// A cache snapshot covering exactly the current membership is reused
    /// without a request. Otherwise every member is fetched in one batch;
    /// members the source omits get all-null rows. On failure nothing in
    /// memory or storage changes.
    pub async fn refresh_all(&self) -> Result<Vec<MetricRow>, ListError> {
        if self.spec.id.is_server_determined() {
            return self.refresh_dashboard().await;
        }

        let (membership, generation) = {
            let mut state = self.lock();
            let membership = self.ensure_loaded(&mut state).clone();
            (membership, state.generation)
        };

        if membership.is_empty() {
            self.lock().rows.clear();
            self.emit(ListEvent::RowsReplaced(self.spec.id));
            return Ok(Vec::new());
        }

        if let Some(snapshot) = self.read_cache().filter(|s| s.matches(&membership)) {
            tracing::debug!(list = %self.spec.id, "reusing cached rows");
            let rows = snapshot.rows_in_order(&membership);
            {
                let mut state = self.lock();
                state.rows = rows.clone();
                state.fetched_at = snapshot.fetched_at;
            }
            self.emit(ListEvent::RowsReplaced(self.spec.id));
            return Ok(rows);
        }

        let fetched = match self.source.fetch_metrics(&membership).await {
            Ok(rows) => rows,
            Err(e) => return Err(self.fail(e)),
        };

        let mut by_symbol: HashMap<Symbol, MetricRow> = HashMap::new();
        for row in fetched {
            by_symbol.entry(row.symbol.clone()).or_insert(row);
        }
        let rows: Vec<MetricRow> = membership
            .iter()
            .map(|s| {
                by_symbol
                    .remove(s)
                    .unwrap_or_else(|| MetricRow::empty(s.clone()))
            })
            .collect();

        self.install(generation, rows.clone(), None)?;
        Ok(rows)
    }

    /// Price a single member, typically right after [`add`](Self::add).
    ///
    /// If the request fails or the source has nothing for the symbol, the
    /// symbol is taken back out of the list.
    pub async fn refresh_one(&self, symbol: &Symbol) -> Result<MetricRow, ListError> {
        let result = self.source.fetch_metrics(std::slice::from_ref(symbol)).await;
        let row = match result {
            Ok(rows) => rows.into_iter().find(|r| &r.symbol == symbol),
            Err(e) => {
                self.remove(symbol);
                return Err(self.fail(e));
            }
        };
        let Some(row) = row else {
            tracing::warn!(list = %self.spec.id, %symbol, "no data for new symbol; rolling back");
            self.remove(symbol);
            return Err(ListError::NoData(symbol.clone()));
        };

        {
            let mut state = self.lock();
            let membership = self.ensure_loaded(&mut state).clone();
            if !membership.contains(symbol) {
                return Err(ListError::Stale);
            }
            let mut current: HashMap<Symbol, MetricRow> = state
                .rows
                .drain(..)
                .map(|r| (r.symbol.clone(), r))
                .collect();
            current.insert(symbol.clone(), row.clone());
            // The cache only ever holds fetched rows.
            let complete = membership.iter().all(|s| current.contains_key(s));
            state.rows = membership
                .iter()
                .map(|s| {
                    current
                        .remove(s)
                        .unwrap_or_else(|| MetricRow::empty(s.clone()))
                })
                .collect();
            if complete {
                self.write_cache(&CacheSnapshot::from_rows(&state.rows));
            }
        }

        self.emit(ListEvent::RowsReplaced(self.spec.id));
        Ok(row)
    }

    async fn refresh_dashboard(&self) -> Result<Vec<MetricRow>, ListError> {
        let generation = {
            let mut state = self.lock();
            self.ensure_loaded(&mut state);
            state.generation
        };

        let rows = match self.source.fetch_dashboard().await {
            Ok(rows) => rows,
            Err(e) => return Err(self.fail(e)),
        };

        let membership: Vec<Symbol> = rows.iter().map(|r| r.symbol.clone()).collect();
        self.install(generation, rows.clone(), Some(membership))?;
        Ok(rows)
    }

    /// Swap in freshly fetched rows unless the list moved on meanwhile.
    fn install(
        &self,
        generation: u64,
        rows: Vec<MetricRow>,
        membership: Option<Vec<Symbol>>,
    ) -> Result<(), ListError> {
        {
            let mut state = self.lock();
            if state.generation != generation {
                tracing::debug!(list = %self.spec.id, "discarding stale refresh");
                return Err(ListError::Stale);
            }
            let snapshot = CacheSnapshot::from_rows(&rows);
            if let Some(membership) = membership {
                self.persist_membership(&membership);
                state.membership = Some(membership);
            }
            state.rows = rows;
            state.fetched_at = snapshot.fetched_at;
            self.write_cache(&snapshot);
        }

        tracing::info!(list = %self.spec.id, "rows refreshed");
        self.emit(ListEvent::RowsReplaced(self.spec.id));
        Ok(())
    }

    fn fail(&self, error: SourceError) -> ListError {
        tracing::warn!(list = %self.spec.id, %error, "refresh failed");
        self.emit(ListEvent::RefreshFailed(self.spec.id, error.to_string()));
        ListError::Source(error)
    }

    fn lock(&self) -> MutexGuard<'_, ListState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn ensure_loaded<'a>(&self, state: &'a mut ListState) -> &'a mut Vec<Symbol> {
        state
            .membership
            .get_or_insert_with(|| self.read_membership().0)
    }

    fn read_membership(&self) -> (Vec<Symbol>, LoadOrigin) {
        let key = membership_key(self.spec.id.stem());
        match self.storage.read::<Vec<String>>(&key) {
            Stored::Loaded(raw) => {
                let membership = normalize_all(&raw);
                if membership.is_empty() {
                    (self.spec.defaults.clone(), LoadOrigin::Defaults)
                } else {
                    (membership, LoadOrigin::Persisted)
                }
            }
            Stored::Missing => (self.spec.defaults.clone(), LoadOrigin::Defaults),
            Stored::Corrupt(reason) => {
                tracing::warn!(list = %self.spec.id, %reason, "stored membership unreadable; using defaults");
                (self.spec.defaults.clone(), LoadOrigin::Recovered)
            }
        }
    }

    fn persist_membership(&self, membership: &[Symbol]) {
        let key = membership_key(self.spec.id.stem());
        if let Err(e) = self.storage.write(&key, membership) {
            tracing::warn!(list = %self.spec.id, error = %e, "failed to persist membership");
        }
    }

    fn read_cache(&self) -> Option<CacheSnapshot> {
        match self.storage.read::<CacheSnapshot>(&cache_key(self.spec.id.stem())) {
            Stored::Loaded(snapshot) => Some(snapshot),
            Stored::Missing => None,
            Stored::Corrupt(reason) => {
                tracing::warn!(list = %self.spec.id, %reason, "cache snapshot unreadable; ignoring");
                None
            }
        }
    }

    fn write_cache(&self, snapshot: &CacheSnapshot) {
        if let Err(e) = self.storage.write(&cache_key(self.spec.id.stem()), snapshot) {
            tracing::warn!(list = %self.spec.id, error = %e, "failed to write cache snapshot");
        }
    }

    fn prune_cache(&self, removed: &Symbol, remaining: &[Symbol], rows: &[MetricRow]) {
        let key = cache_key(self.spec.id.stem());
        if remaining.is_empty() {
            if let Err(e) = self.storage.remove(&key) {
                tracing::warn!(list = %self.spec.id, error = %e, "failed to delete cache snapshot");
            }
            return;
        }

        match self.read_cache() {
            Some(mut snapshot) => {
                snapshot.symbols.retain(|s| s != removed);
                snapshot.rows.retain(|r| &r.symbol != removed);
                self.write_cache(&snapshot);
            }
            None if !rows.is_empty() => self.write_cache(&CacheSnapshot::from_rows(rows)),
            None => {}
        }
    }

    fn emit(&self, event: ListEvent) {
        if self.events.send(event).is_err() {
            tracing::trace!(list = %self.spec.id, "no subscribers for list event");
        }
    }
}

/// Normalize and de-duplicate, keeping first occurrences.
pub fn normalize_all(raw: &[String]) -> Vec<Symbol> {
    let mut seen = HashSet::new();
    raw.iter()
        .filter_map(|s| Symbol::parse(s))
        .filter(|s| seen.insert(s.clone()))
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::sync::Notify;

    /// Scriptable quote source.
    #[derive(Default)]
    pub(crate) struct MockSource {
        pub known: Mutex<HashMap<Symbol, MetricRow>>,
        pub dashboard: Mutex<Vec<MetricRow>>,
        pub fail: AtomicBool,
        pub calls: AtomicUsize,
        pub requested: Mutex<Vec<Vec<Symbol>>>,
        pub gate: Option<Arc<Notify>>,
    }

    impl MockSource {
        pub fn with_rows(rows: &[MetricRow]) -> Self {
            let source = Self::default();
            source.set_rows(rows);
            source
        }

        pub fn set_rows(&self, rows: &[MetricRow]) {
            let mut known = self.known.lock().unwrap();
            for row in rows {
                known.insert(row.symbol.clone(), row.clone());
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl QuoteSource for MockSource {
        async fn fetch_metrics(&self, symbols: &[Symbol]) -> Result<Vec<MetricRow>, SourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requested.lock().unwrap().push(symbols.to_vec());
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err(SourceError::Transport("connection refused".to_string()));
            }
            let known = self.known.lock().unwrap();
            Ok(symbols.iter().filter_map(|s| known.get(s).cloned()).collect())
        }

        async fn fetch_dashboard(&self) -> Result<Vec<MetricRow>, SourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err(SourceError::Fetch {
                    status: 500,
                    status_text: "Internal Server Error".to_string(),
                });
            }
            Ok(self.dashboard.lock().unwrap().clone())
        }
    }

    pub(crate) fn sym(s: &str) -> Symbol {
        Symbol::parse(s).unwrap()
    }

    pub(crate) fn row(s: &str, p1: f64) -> MetricRow {
        MetricRow {
            perf1d: Some(p1),
            rsi14: Some(50.0),
            ..MetricRow::empty(sym(s))
        }
    }

    fn store_with(
        id: ListId,
        defaults: &[&str],
        storage: Arc<MemoryStorage>,
        source: Arc<MockSource>,
    ) -> SymbolListStore {
        let spec = ListSpec {
            id,
            defaults: defaults.iter().map(|s| sym(s)).collect(),
        };
        SymbolListStore::new(spec, storage, source)
    }

    fn symbols(rows: &[MetricRow]) -> Vec<&str> {
        rows.iter().map(|r| r.symbol.as_str()).collect()
    }

    fn write_snapshot(storage: &MemoryStorage, stem: &str, rows: &[MetricRow]) {
        storage
            .write(&cache_key(stem), &CacheSnapshot::from_rows(rows))
            .unwrap();
    }

    #[test]
    fn test_load_defaults_without_persisting() {
        let storage = Arc::new(MemoryStorage::new());
        let store = store_with(ListId::WatchlistA, &["AAPL", "MSFT"], storage.clone(), Arc::default());

        let (symbols, origin) = store.load();
        assert_eq!(symbols, vec![sym("AAPL"), sym("MSFT")]);
        assert_eq!(origin, LoadOrigin::Defaults);
        assert_eq!(storage.get_raw("list.cub").unwrap(), None);
    }

    #[test]
    fn test_load_corrupt_membership_recovers() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set_raw("list.cub", "{\"oops\": true}").unwrap();
        let store = store_with(ListId::WatchlistA, &["AAPL"], storage, Arc::default());

        let (symbols, origin) = store.load();
        assert_eq!(symbols, vec![sym("AAPL")]);
        assert_eq!(origin, LoadOrigin::Recovered);
    }

    #[test]
    fn test_load_normalizes_persisted_membership() {
        let storage = Arc::new(MemoryStorage::new());
        storage.write("list.ft", &vec!["amd", " AMD", "", "intc"]).unwrap();
        let store = store_with(ListId::WatchlistB, &["X"], storage, Arc::default());

        let (symbols, origin) = store.load();
        assert_eq!(symbols, vec![sym("AMD"), sym("INTC")]);
        assert_eq!(origin, LoadOrigin::Persisted);
    }

    #[test]
    fn test_add_is_case_insensitive_and_persists() {
        let storage = Arc::new(MemoryStorage::new());
        let store = store_with(ListId::WatchlistA, &["AAPL"], storage.clone(), Arc::default());

        assert!(store.add(" tsla "));
        assert!(!store.add("TSLA"));
        assert!(!store.add("Tsla"));
        assert!(!store.add("   "));
        assert_eq!(store.symbols(), vec![sym("AAPL"), sym("TSLA")]);

        let persisted: Vec<String> = storage.read("list.cub").loaded().unwrap();
        assert_eq!(persisted, vec!["AAPL", "TSLA"]);
    }

    #[test]
    fn test_add_rejected_on_server_list() {
        let store = store_with(ListId::Rebound, &[], Arc::default(), Arc::default());
        assert!(!store.add("AAPL"));
        assert!(store.symbols().is_empty());
    }

    #[tokio::test]
    async fn test_refresh_all_fills_missing_with_nulls() {
        let source = Arc::new(MockSource::with_rows(&[row("AAPL", 1.0)]));
        let storage = Arc::new(MemoryStorage::new());
        let store = store_with(ListId::WatchlistA, &["AAPL", "ZZZZ"], storage.clone(), source.clone());

        let rows = store.refresh_all().await.unwrap();
        assert_eq!(symbols(&rows), ["AAPL", "ZZZZ"]);
        assert_eq!(rows[0].perf1d, Some(1.0));
        assert_eq!(rows[1], MetricRow::empty(sym("ZZZZ")));
        assert_eq!(source.calls(), 1);

        let snapshot: CacheSnapshot = storage.read("cache.cub").loaded().unwrap();
        assert!(snapshot.matches(&[sym("ZZZZ"), sym("AAPL")]));
    }

    #[tokio::test]
    async fn test_cache_reuse_reorders_without_network() {
        let storage = Arc::new(MemoryStorage::new());
        storage.write("list.cub", &vec!["B", "A"]).unwrap();
        write_snapshot(&storage, "cub", &[row("A", 1.0), row("B", 2.0)]);
        let source = Arc::new(MockSource::default());
        let store = store_with(ListId::WatchlistA, &[], storage, source.clone());

        let rows = store.refresh_all().await.unwrap();
        assert_eq!(symbols(&rows), ["B", "A"]);
        assert_eq!(rows[0].perf1d, Some(2.0));
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn test_cache_invalidated_on_set_mismatch() {
        let storage = Arc::new(MemoryStorage::new());
        storage.write("list.cub", &vec!["A", "B", "C"]).unwrap();
        write_snapshot(&storage, "cub", &[row("A", 1.0), row("B", 2.0)]);
        let source = Arc::new(MockSource::with_rows(&[row("A", 1.0), row("B", 2.0), row("C", 3.0)]));
        let store = store_with(ListId::WatchlistA, &[], storage, source.clone());

        let rows = store.refresh_all().await.unwrap();
        assert_eq!(symbols(&rows), ["A", "B", "C"]);
        assert_eq!(source.calls(), 1);
        assert_eq!(source.requested.lock().unwrap()[0], vec![sym("A"), sym("B"), sym("C")]);
    }

    #[tokio::test]
    async fn test_remove_then_refresh_never_reintroduces() {
        let storage = Arc::new(MemoryStorage::new());
        let source = Arc::new(MockSource::with_rows(&[row("A", 1.0), row("B", 2.0), row("C", 3.0)]));
        let store = store_with(ListId::WatchlistA, &["A", "B", "C"], storage.clone(), source.clone());
        store.refresh_all().await.unwrap();

        assert!(store.remove(&sym("b")));
        assert!(!store.remove(&sym("B")));
        // A stale superset snapshot left behind by another writer.
        write_snapshot(&storage, "cub", &[row("A", 1.0), row("B", 2.0), row("C", 3.0)]);

        let rows = store.refresh_all().await.unwrap();
        assert_eq!(symbols(&rows), ["A", "C"]);
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn test_remove_prunes_and_deletes_cache() {
        let storage = Arc::new(MemoryStorage::new());
        let source = Arc::new(MockSource::with_rows(&[row("A", 1.0), row("B", 2.0)]));
        let store = store_with(ListId::WatchlistC, &["A", "B"], storage.clone(), source.clone());
        store.refresh_all().await.unwrap();

        store.remove(&sym("A"));
        assert_eq!(symbols(&store.rows()), ["B"]);
        let snapshot: CacheSnapshot = storage.read("cache.oo").loaded().unwrap();
        assert!(snapshot.matches(&[sym("B")]));

        // Still valid, so the next refresh stays offline.
        store.refresh_all().await.unwrap();
        assert_eq!(source.calls(), 1);

        store.remove(&sym("B"));
        assert_eq!(storage.get_raw("cache.oo").unwrap(), None);
        assert!(store.rows().is_empty());
    }

    #[tokio::test]
    async fn test_failed_refresh_leaves_state_untouched() {
        let storage = Arc::new(MemoryStorage::new());
        let source = Arc::new(MockSource::with_rows(&[row("A", 1.0)]));
        let store = store_with(ListId::WatchlistA, &["A"], storage.clone(), source.clone());
        store.refresh_all().await.unwrap();
        let cached_before = storage.get_raw("cache.cub").unwrap();

        store.add("B");
        source.fail.store(true, Ordering::SeqCst);
        let mut events = store.subscribe();
        let err = store.refresh_all().await.unwrap_err();

        assert!(matches!(err, ListError::Source(SourceError::Transport(_))));
        assert_eq!(symbols(&store.rows()), ["A"]);
        assert_eq!(storage.get_raw("cache.cub").unwrap(), cached_before);
        assert!(matches!(events.try_recv(), Ok(ListEvent::RefreshFailed(ListId::WatchlistA, _))));
    }

    #[tokio::test]
    async fn test_add_then_failed_price_rolls_back() {
        let storage = Arc::new(MemoryStorage::new());
        let source = Arc::new(MockSource::with_rows(&[row("AAPL", 1.0)]));
        let store = store_with(ListId::WatchlistA, &["AAPL"], storage.clone(), source.clone());

        assert!(store.add("tsla"));
        assert_eq!(store.symbols().last(), Some(&sym("TSLA")));

        source.fail.store(true, Ordering::SeqCst);
        let err = store.refresh_one(&sym("TSLA")).await.unwrap_err();
        assert!(matches!(err, ListError::Source(_)));
        assert!(!store.contains(&sym("TSLA")));

        let persisted: Vec<String> = storage.read("list.cub").loaded().unwrap();
        assert_eq!(persisted, vec!["AAPL"]);
    }

    #[tokio::test]
    async fn test_add_without_data_rolls_back() {
        let source = Arc::new(MockSource::default());
        let store = store_with(ListId::WatchlistB, &[], Arc::default(), source);

        assert!(store.add("NOPE"));
        let err = store.refresh_one(&sym("NOPE")).await.unwrap_err();
        assert!(matches!(err, ListError::NoData(ref s) if s == &sym("NOPE")));
        assert!(store.symbols().is_empty());
    }

    #[tokio::test]
    async fn test_refresh_one_merges_in_list_order() {
        let storage = Arc::new(MemoryStorage::new());
        let source = Arc::new(MockSource::with_rows(&[row("A", 1.0), row("B", 2.0)]));
        let store = store_with(ListId::WatchlistA, &["A", "B"], storage.clone(), source.clone());
        store.refresh_all().await.unwrap();

        source.set_rows(&[row("C", 3.0)]);
        store.add("c");
        let priced = store.refresh_one(&sym("C")).await.unwrap();
        assert_eq!(priced.perf1d, Some(3.0));
        assert_eq!(symbols(&store.rows()), ["A", "B", "C"]);

        // The snapshot now covers the full list, so no further request.
        store.refresh_all().await.unwrap();
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn test_add_on_unfetched_list_keeps_every_member() {
        let storage = Arc::new(MemoryStorage::new());
        let source = Arc::new(MockSource::with_rows(&[row("AAPL", 1.0), row("MSFT", 2.0), row("TSLA", 3.0)]));
        let store = store_with(ListId::WatchlistA, &["AAPL", "MSFT"], storage.clone(), source.clone());

        assert!(store.add("tsla"));
        store.refresh_one(&sym("TSLA")).await.unwrap();

        let rows = store.rows();
        assert_eq!(symbols(&rows), ["AAPL", "MSFT", "TSLA"]);
        assert_eq!(rows[0], MetricRow::empty(sym("AAPL")));
        assert_eq!(rows[2].perf1d, Some(3.0));
        assert!(storage.read::<CacheSnapshot>("cache.cub").loaded().is_none());

        // Placeholder rows never satisfy the cache, so the full fetch runs.
        let rows = store.refresh_all().await.unwrap();
        assert_eq!(source.calls(), 2);
        assert_eq!(rows[0].perf1d, Some(1.0));
    }

    #[tokio::test]
    async fn test_refresh_absent_symbol_kept_with_nulls() {
        let source = Arc::new(MockSource::with_rows(&[row("A", 1.0), row("B", 2.0)]));
        let storage = Arc::new(MemoryStorage::new());
        let store = store_with(ListId::WatchlistA, &["A", "B"], storage.clone(), source.clone());
        store.refresh_all().await.unwrap();

        source.known.lock().unwrap().remove(&sym("B"));
        storage.remove("cache.cub").unwrap();
        let rows = store.refresh_all().await.unwrap();
        assert_eq!(symbols(&rows), ["A", "B"]);
        assert_eq!(rows[1].perf1d, None);
    }

    #[tokio::test]
    async fn test_stale_refresh_is_discarded() {
        let gate = Arc::new(Notify::new());
        let source = Arc::new(MockSource {
            gate: Some(gate.clone()),
            ..MockSource::with_rows(&[row("A", 1.0)])
        });
        let storage = Arc::new(MemoryStorage::new());
        let store = Arc::new(store_with(ListId::WatchlistA, &["A"], storage.clone(), source.clone()));

        let pending = {
            let store = store.clone();
            tokio::spawn(async move { store.refresh_all().await })
        };
        while source.calls() == 0 {
            tokio::task::yield_now().await;
        }

        store.add("B");
        gate.notify_one();
        let result = pending.await.unwrap();

        assert!(matches!(result, Err(ListError::Stale)));
        assert!(store.rows().is_empty());
        assert_eq!(storage.get_raw("cache.cub").unwrap(), None);
    }

    #[test]
    fn test_restore_cached_requires_matching_set() {
        let storage = Arc::new(MemoryStorage::new());
        write_snapshot(&storage, "cub", &[row("A", 1.0)]);
        let store = store_with(ListId::WatchlistA, &["A", "B"], storage.clone(), Arc::default());
        assert!(!store.restore_cached());
        assert!(store.rows().is_empty());

        write_snapshot(&storage, "cub", &[row("B", 2.0), row("A", 1.0)]);
        assert!(store.restore_cached());
        assert_eq!(symbols(&store.rows()), ["A", "B"]);
        assert!(store.fetched_at().is_some());
    }

    #[tokio::test]
    async fn test_dashboard_refresh_replaces_membership() {
        let storage = Arc::new(MemoryStorage::new());
        let source = Arc::new(MockSource::default());
        *source.dashboard.lock().unwrap() = vec![row("AAPL", 1.2), row("AMAT", 0.5)];
        let store = store_with(ListId::Rebound, &[], storage.clone(), source.clone());

        let rows = store.refresh_all().await.unwrap();
        assert_eq!(symbols(&rows), ["AAPL", "AMAT"]);
        assert_eq!(store.symbols(), vec![sym("AAPL"), sym("AMAT")]);
        let persisted: Vec<String> = storage.read("list.rebound").loaded().unwrap();
        assert_eq!(persisted, vec!["AAPL", "AMAT"]);

        // Server-determined lists always go to the network.
        store.refresh_all().await.unwrap();
        assert_eq!(source.calls(), 2);

        source.fail.store(true, Ordering::SeqCst);
        let err = store.refresh_all().await.unwrap_err();
        assert!(err.to_string().contains("500"));
        assert_eq!(symbols(&store.rows()), ["AAPL", "AMAT"]);
    }

    #[tokio::test]
    async fn test_rebound_refuses_remove() {
        let storage = Arc::new(MemoryStorage::new());
        let source = Arc::new(MockSource::default());
        *source.dashboard.lock().unwrap() = vec![row("AAPL", 1.2), row("AMAT", 0.5)];
        let store = store_with(ListId::Rebound, &[], storage.clone(), source.clone());
        store.refresh_all().await.unwrap();

        assert!(!store.remove(&sym("AAPL")));
        assert_eq!(store.symbols(), vec![sym("AAPL"), sym("AMAT")]);

        let rows = store.refresh_all().await.unwrap();
        assert_eq!(symbols(&rows), ["AAPL", "AMAT"]);
        let persisted: Vec<String> = storage.read("list.rebound").loaded().unwrap();
        assert_eq!(persisted, vec!["AAPL", "AMAT"]);
    }

    #[test]
    fn test_seed_only_fills_unpersisted_lists() {
        let storage = Arc::new(MemoryStorage::new());
        storage.write("list.ft", &vec!["AMD"]).unwrap();
        let seeded = store_with(ListId::WatchlistA, &["AAPL"], storage.clone(), Arc::default());
        let kept = store_with(ListId::WatchlistB, &["AMAT"], storage.clone(), Arc::default());

        assert!(seeded.seed(&[sym("GOOG"), sym("META"), sym("GOOG")]));
        assert!(!kept.seed(&[sym("GOOG")]));

        assert_eq!(seeded.symbols(), vec![sym("GOOG"), sym("META")]);
        assert_eq!(kept.symbols(), vec![sym("AMD")]);
        let persisted: Vec<String> = storage.read("list.cub").loaded().unwrap();
        assert_eq!(persisted, vec!["GOOG", "META"]);
    }

    #[test]
    fn test_sorted_view_leaves_stored_order() {
        let storage = Arc::new(MemoryStorage::new());
        write_snapshot(&storage, "cub", &[row("B", 2.0), row("A", 1.0), row("C", 3.0)]);
        let store = store_with(ListId::WatchlistA, &["B", "A", "C"], storage, Arc::default());
        assert!(store.restore_cached());

        let view = store.sorted_view(SortKey::Perf1d, SortDirection::Descending);
        assert_eq!(symbols(&view), ["C", "B", "A"]);
        assert_eq!(symbols(&store.rows()), ["B", "A", "C"]);
    }
}
