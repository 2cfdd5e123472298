//! The set of lists shown together, sharing one storage and one source.

use crate::api::QuoteSource;
use crate::config::ListsConfig;
use crate::export::BoardExport;
use crate::models::{ListId, MetricRow, SortDirection, SortKey, Symbol, sort_rows};
use crate::starred::StarredStore;
use crate::storage::Storage;
use crate::store::{ListError, ListSpec, SymbolListStore};
use std::sync::Arc;

pub struct Board {
    lists: Vec<SymbolListStore>,
    starred: StarredStore,
}

impl Board {
    pub fn new(storage: Arc<dyn Storage>, source: Arc<dyn QuoteSource>, defaults: &ListsConfig) -> Self {
        let lists = ListId::STORED
            .iter()
            .map(|&id| {
                let spec = ListSpec {
                    id,
                    defaults: defaults.defaults_for(id),
                };
                SymbolListStore::new(spec, storage.clone(), source.clone())
            })
            .collect();

        Self {
            lists,
            starred: StarredStore::load(storage),
        }
    }

    /// The store behind a list; `None` for the starred list.
    pub fn list(&self, id: ListId) -> Option<&SymbolListStore> {
        self.lists.iter().find(|l| l.id() == id)
    }

    pub fn lists(&self) -> &[SymbolListStore] {
        &self.lists
    }

    pub fn starred(&self) -> &StarredStore {
        &self.starred
    }

    /// Show whatever each list has cached, without network access.
    pub fn restore(&self) {
        for list in &self.lists {
            let (symbols, origin) = list.load();
            let restored = list.restore_cached();
            tracing::debug!(list = %list.id(), count = symbols.len(), ?origin, restored, "loaded list");
        }
    }

    pub fn rows(&self, id: ListId) -> Vec<MetricRow> {
        match self.list(id) {
            Some(list) => list.rows(),
            None => self.starred.rows(),
        }
    }

    pub fn sorted_view(&self, id: ListId, key: SortKey, direction: SortDirection) -> Vec<MetricRow> {
        match self.list(id) {
            Some(list) => list.sorted_view(key, direction),
            None => sort_rows(&self.starred.rows(), key, direction),
        }
    }

    /// Refresh one list and fold fresh rows into matching starred entries.
    ///
    /// The starred list itself is never fetched; it only picks up rows
    /// the other lists currently hold.
    pub async fn refresh(&self, id: ListId) -> Result<Vec<MetricRow>, ListError> {
        match self.list(id) {
            Some(list) => {
                let rows = list.refresh_all().await?;
                self.starred.absorb(&rows);
                Ok(rows)
            }
            None => {
                for list in &self.lists {
                    self.starred.absorb(&list.rows());
                }
                Ok(self.starred.rows())
            }
        }
    }

    /// Add a symbol and price it; the add is undone if pricing fails.
    ///
    /// Returns `Ok(None)` when the symbol was blank, a duplicate, or the
    /// list does not accept additions.
    pub async fn add_and_price(&self, id: ListId, raw: &str) -> Result<Option<MetricRow>, ListError> {
        let Some(list) = self.list(id) else {
            return Ok(None);
        };
        let Some(symbol) = Symbol::parse(raw) else {
            return Ok(None);
        };
        if !list.add(symbol.as_str()) {
            return Ok(None);
        }
        let row = list.refresh_one(&symbol).await?;
        self.starred.absorb(std::slice::from_ref(&row));
        Ok(Some(row))
    }

    /// Remove from a list; on the starred list this unstars.
    pub fn remove(&self, id: ListId, symbol: &Symbol) -> bool {
        match self.list(id) {
            Some(list) => list.remove(symbol),
            None => self.starred.is_starred(symbol) && !self.starred.toggle(symbol, None),
        }
    }

    /// Star or unstar, freezing the row currently shown for the symbol.
    pub fn toggle_star(&self, id: ListId, symbol: &Symbol) -> bool {
        let snapshot = self.rows(id).into_iter().find(|r| &r.symbol == symbol);
        self.starred.toggle(symbol, snapshot.as_ref())
    }

    /// Snapshot of the user lists and starred entries.
    pub fn export(&self) -> BoardExport {
        let symbols = |id| self.list(id).map(SymbolListStore::symbols).unwrap_or_default();
        BoardExport {
            cub: symbols(ListId::WatchlistA),
            ft: symbols(ListId::WatchlistB),
            oo: symbols(ListId::WatchlistC),
            starred: self.starred.entries(),
        }
    }

    /// Fill every list that has nothing persisted from `doc`.
    ///
    /// Returns the lists that were seeded.
    pub fn seed(&self, doc: &BoardExport) -> Vec<ListId> {
        let mut seeded = Vec::new();
        for (id, symbols) in [
            (ListId::WatchlistA, &doc.cub),
            (ListId::WatchlistB, &doc.ft),
            (ListId::WatchlistC, &doc.oo),
        ] {
            if self.list(id).is_some_and(|list| list.seed(symbols)) {
                seeded.push(id);
            }
        }
        if self.starred.is_empty() && !doc.starred.is_empty() {
            self.starred.replace(doc.starred.clone());
            seeded.push(ListId::Starred);
        }
        seeded
    }
}
