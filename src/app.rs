//! Application state and logic.

use crate::board::Board;
use crate::models::{ListId, MetricRow, SortDirection, SortKey, Symbol};
use crate::store::{ListError, ListEvent};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::broadcast::{self, error::TryRecvError};

/// Application state.
pub struct App {
    /// Every list on the dashboard
    pub board: Board,
    /// List currently shown
    pub active: ListId,
    /// Per-list sort state; presentation only, never persisted
    sort: HashMap<ListId, (SortKey, SortDirection)>,
    default_sort: (SortKey, SortDirection),
    /// Is the app running
    pub running: bool,
    /// Error message to display, with a retry hint
    pub error: Option<String>,
    /// One-line status message
    pub status: Option<String>,
    /// Selected row index
    pub selected: usize,
    /// Show help overlay
    pub show_help: bool,
    /// Add-symbol prompt contents while typing
    pub input: Option<String>,
    /// A request is in flight for the active list
    pub loading: bool,
    events: Vec<broadcast::Receiver<ListEvent>>,
}

impl App {
    pub fn new(board: Board, active: ListId, sort_key: SortKey, direction: SortDirection) -> Self {
        let events = board.lists().iter().map(|l| l.subscribe()).collect();
        Self {
            board,
            active,
            sort: HashMap::new(),
            default_sort: (sort_key, direction),
            running: true,
            error: None,
            status: None,
            selected: 0,
            show_help: false,
            input: None,
            loading: false,
            events,
        }
    }

    /// Sort state of the active list.
    pub fn sort_state(&self) -> (SortKey, SortDirection) {
        self.sort.get(&self.active).copied().unwrap_or(self.default_sort)
    }

    /// Rows of the active list as they should be displayed.
    pub fn visible_rows(&self) -> Vec<MetricRow> {
        let (key, direction) = self.sort_state();
        self.board.sorted_view(self.active, key, direction)
    }

    pub fn selected_row(&self) -> Option<MetricRow> {
        self.visible_rows().into_iter().nth(self.selected)
    }

    pub fn is_starred(&self, symbol: &Symbol) -> bool {
        self.board.starred().is_starred(symbol)
    }

    /// Refresh the active list, recording any failure for display.
    pub async fn refresh_active(&mut self) {
        self.loading = true;
        let result = self.board.refresh(self.active).await;
        self.loading = false;
        match result {
            Ok(_) => self.error = None,
            Err(ListError::Stale) => tracing::debug!(list = %self.active, "refresh superseded"),
            Err(e) => self.error = Some(format!("{}: {}", self.active.title(), e)),
        }
        self.clamp_selection();
    }

    /// Add a symbol to the active list and price it.
    pub async fn add_symbol(&mut self, raw: &str) {
        if self.active == ListId::Starred {
            match Symbol::parse(raw) {
                Some(symbol) if !self.is_starred(&symbol) => {
                    self.board.toggle_star(self.active, &symbol);
                    self.status = Some(format!("Starred {}", symbol));
                }
                _ => self.status = Some("Nothing added".to_string()),
            }
            return;
        }

        self.loading = true;
        let result = self.board.add_and_price(self.active, raw).await;
        self.loading = false;
        match result {
            Ok(Some(row)) => self.status = Some(format!("Added {}", row.symbol)),
            Ok(None) => self.status = Some(format!("Nothing added to {}", self.active.title())),
            Err(e) => self.error = Some(format!("Could not add {}: {}", raw.trim(), e)),
        }
        self.clamp_selection();
    }

    /// Remove the selected row from the active list.
    pub fn remove_selected(&mut self) {
        if self.active.is_server_determined() {
            self.status = Some(format!("{} is chosen by the server", self.active.title()));
            return;
        }
        if let Some(row) = self.selected_row() {
            if self.board.remove(self.active, &row.symbol) {
                self.status = Some(format!("Removed {}", row.symbol));
            }
        }
        self.clamp_selection();
    }

    /// Star or unstar the selected row.
    pub fn toggle_star_selected(&mut self) {
        if let Some(row) = self.selected_row() {
            let starred = self.board.toggle_star(self.active, &row.symbol);
            self.status = Some(format!(
                "{} {}",
                if starred { "Starred" } else { "Unstarred" },
                row.symbol
            ));
        }
        self.clamp_selection();
    }

    /// Consume store notifications; returns true if anything changed.
    pub fn drain_events(&mut self) -> bool {
        let mut changed = false;
        for receiver in &mut self.events {
            loop {
                match receiver.try_recv() {
                    Ok(event) => {
                        tracing::trace!(?event, "list event");
                        changed = true;
                    }
                    Err(TryRecvError::Lagged(_)) => changed = true,
                    Err(TryRecvError::Empty | TryRecvError::Closed) => break,
                }
            }
        }
        if changed {
            self.clamp_selection();
        }
        changed
    }

    /// Switch to the next list tab.
    pub fn next_list(&mut self) {
        self.select_list(self.active.next());
    }

    pub fn select_list(&mut self, id: ListId) {
        self.active = id;
        self.selected = 0;
        self.error = None;
        self.status = None;
    }

    /// Toggle sort direction.
    pub fn toggle_sort_direction(&mut self) {
        let (key, direction) = self.sort_state();
        self.sort.insert(self.active, (key, direction.toggle()));
    }

    /// Cycle to next sort key.
    pub fn next_sort_key(&mut self) {
        let (key, direction) = self.sort_state();
        self.sort.insert(self.active, (key.next(), direction));
    }

    /// Set a specific sort key; picking the current key flips direction.
    pub fn set_sort_key(&mut self, key: SortKey) {
        let (current, _) = self.sort_state();
        if current == key {
            self.toggle_sort_direction();
        } else {
            self.sort.insert(self.active, (key, SortDirection::Descending));
        }
    }

    /// Move selection up.
    pub fn select_up(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    /// Move selection down.
    pub fn select_down(&mut self) {
        if self.selected < self.visible_rows().len().saturating_sub(1) {
            self.selected += 1;
        }
    }

    /// Move selection to top.
    pub fn select_top(&mut self) {
        self.selected = 0;
    }

    /// Move selection to bottom.
    pub fn select_bottom(&mut self) {
        self.selected = self.visible_rows().len().saturating_sub(1);
    }

    fn clamp_selection(&mut self) {
        let len = self.visible_rows().len();
        if self.selected >= len {
            self.selected = len.saturating_sub(1);
        }
    }

    /// Toggle help display.
    pub fn toggle_help(&mut self) {
        self.show_help = !self.show_help;
    }

    /// Quit the application.
    pub fn quit(&mut self) {
        self.running = false;
    }

    pub fn should_quit(&self) -> bool {
        !self.running
    }

    /// When the active list's rows were fetched.
    pub fn fetched_at(&self) -> Option<DateTime<Utc>> {
        self.board.list(self.active).and_then(|l| l.fetched_at())
    }

    /// Age of the active list's data as a human readable string.
    pub fn time_since_refresh(&self) -> String {
        match self.fetched_at() {
            Some(t) => {
                let elapsed = (Utc::now() - t).num_seconds().max(0);
                if elapsed < 60 {
                    format!("{}s ago", elapsed)
                } else if elapsed < 3600 {
                    format!("{}m ago", elapsed / 60)
                } else {
                    format!("{}h ago", elapsed / 3600)
                }
            }
            None => "never".to_string(),
        }
    }
}
