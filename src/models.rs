//! Data models for symbols, metric rows and starred entries.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A normalized ticker symbol (trimmed, uppercase, never empty).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    /// Normalize raw user input into a symbol.
    ///
    /// Returns `None` when nothing is left after trimming.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_uppercase()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Chart page for this symbol.
    pub fn chart_url(&self) -> String {
        format!(
            "https://www.tradingview.com/chart/?symbol={}",
            urlencoding::encode(&self.0)
        )
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Symbol {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Symbol::parse(&value).ok_or_else(|| "symbol must not be blank".to_string())
    }
}

impl From<Symbol> for String {
    fn from(symbol: Symbol) -> Self {
        symbol.0
    }
}

/// One symbol's latest known performance and RSI figures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricRow {
    pub symbol: Symbol,
    #[serde(default)]
    pub perf1d: Option<f64>,
    #[serde(default)]
    pub perf5d: Option<f64>,
    #[serde(default)]
    pub perf20d: Option<f64>,
    #[serde(default)]
    pub perf60d: Option<f64>,
    #[serde(default)]
    pub rsi14: Option<f64>,
    /// Display tag for the curve classification ("V"), rebound rows only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub curve_shape: Option<String>,
}

impl MetricRow {
    /// A row with every metric unknown.
    pub fn empty(symbol: Symbol) -> Self {
        Self {
            symbol,
            perf1d: None,
            perf5d: None,
            perf20d: None,
            perf60d: None,
            rsi14: None,
            curve_shape: None,
        }
    }

    /// Numeric value for a sort key; `None` for the symbol key.
    pub fn metric(&self, key: SortKey) -> Option<f64> {
        match key {
            SortKey::Symbol => None,
            SortKey::Perf1d => self.perf1d,
            SortKey::Perf5d => self.perf5d,
            SortKey::Perf20d => self.perf20d,
            SortKey::Perf60d => self.perf60d,
            SortKey::Rsi14 => self.rsi14,
        }
    }
}

/// A starred symbol, optionally carrying the metrics it had when starred.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StarredEntry {
    Bare(Symbol),
    Snapshot(MetricRow),
}

impl StarredEntry {
    pub fn symbol(&self) -> &Symbol {
        match self {
            StarredEntry::Bare(symbol) => symbol,
            StarredEntry::Snapshot(row) => &row.symbol,
        }
    }

    /// Render as a row; bare entries have no metrics.
    pub fn to_row(&self) -> MetricRow {
        match self {
            StarredEntry::Bare(symbol) => MetricRow::empty(symbol.clone()),
            StarredEntry::Snapshot(row) => row.clone(),
        }
    }
}

/// The named lists shown on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ListId {
    Starred,
    #[default]
    Rebound,
    WatchlistA,
    WatchlistB,
    WatchlistC,
}

impl ListId {
    /// Tab order on the board.
    pub const ALL: [ListId; 5] = [
        ListId::Starred,
        ListId::Rebound,
        ListId::WatchlistA,
        ListId::WatchlistB,
        ListId::WatchlistC,
    ];

    /// Lists backed by a `SymbolListStore`.
    pub const STORED: [ListId; 4] = [
        ListId::Rebound,
        ListId::WatchlistA,
        ListId::WatchlistB,
        ListId::WatchlistC,
    ];

    /// Stem used for storage keys and the export document.
    pub fn stem(self) -> &'static str {
        match self {
            ListId::Starred => "starred",
            ListId::Rebound => "rebound",
            ListId::WatchlistA => "cub",
            ListId::WatchlistB => "ft",
            ListId::WatchlistC => "oo",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            ListId::Starred => "Starred",
            ListId::Rebound => "Rebound Index",
            ListId::WatchlistA => "Watchlist A",
            ListId::WatchlistB => "Watchlist B",
            ListId::WatchlistC => "Watchlist C",
        }
    }

    /// Whether membership is decided by the server rather than the user.
    pub fn is_server_determined(self) -> bool {
        self == ListId::Rebound
    }

    pub fn next(self) -> Self {
        let idx = Self::ALL.iter().position(|id| *id == self).unwrap_or(0);
        Self::ALL[(idx + 1) % Self::ALL.len()]
    }
}

impl fmt::Display for ListId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ListId::Starred => "starred",
            ListId::Rebound => "rebound",
            ListId::WatchlistA => "watchlistA",
            ListId::WatchlistB => "watchlistB",
            ListId::WatchlistC => "watchlistC",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for ListId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "starred" => Ok(ListId::Starred),
            "rebound" => Ok(ListId::Rebound),
            "watchlista" | "a" | "cub" => Ok(ListId::WatchlistA),
            "watchlistb" | "b" | "ft" => Ok(ListId::WatchlistB),
            "watchlistc" | "c" | "oo" => Ok(ListId::WatchlistC),
            other => Err(format!("unknown list: {}", other)),
        }
    }
}

/// Column used to order a list's rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    Symbol,
    Perf1d,
    Perf5d,
    Perf20d,
    Perf60d,
    Rsi14,
}

impl SortKey {
    /// Get the next sort key in cycle.
    pub fn next(self) -> Self {
        match self {
            SortKey::Symbol => SortKey::Perf1d,
            SortKey::Perf1d => SortKey::Perf5d,
            SortKey::Perf5d => SortKey::Perf20d,
            SortKey::Perf20d => SortKey::Perf60d,
            SortKey::Perf60d => SortKey::Rsi14,
            SortKey::Rsi14 => SortKey::Symbol,
        }
    }

    /// Get column header name.
    pub fn header(&self) -> &'static str {
        match self {
            SortKey::Symbol => "SYMBOL",
            SortKey::Perf1d => "1D%",
            SortKey::Perf5d => "5D%",
            SortKey::Perf20d => "20D%",
            SortKey::Perf60d => "60D%",
            SortKey::Rsi14 => "RSI14",
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn toggle(self) -> Self {
        match self {
            SortDirection::Ascending => SortDirection::Descending,
            SortDirection::Descending => SortDirection::Ascending,
        }
    }

    fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        }
    }
}

/// Order rows by `key` without touching the input.
///
/// Symbols compare case-insensitively. Missing metrics always sort after
/// present ones, whichever the direction; ties keep their input order.
pub fn sort_rows(rows: &[MetricRow], key: SortKey, direction: SortDirection) -> Vec<MetricRow> {
    let mut sorted = rows.to_vec();
    sorted.sort_by(|a, b| compare_rows(a, b, key, direction));
    sorted
}

fn compare_rows(a: &MetricRow, b: &MetricRow, key: SortKey, direction: SortDirection) -> Ordering {
    if key == SortKey::Symbol {
        let ord = a
            .symbol
            .as_str()
            .to_lowercase()
            .cmp(&b.symbol.as_str().to_lowercase());
        return direction.apply(ord);
    }

    match (a.metric(key), b.metric(key)) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(x), Some(y)) => direction.apply(x.total_cmp(&y)),
    }
}
