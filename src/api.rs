//! Client for the price-performance and dashboard endpoints.

use crate::models::{MetricRow, Symbol};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// Upstream API host the app talks to by default.
pub const DEFAULT_API_BASE: &str = "https://web-production-1b15c.up.railway.app";

const USER_AGENT: &str = concat!("watchboard/", env!("CARGO_PKG_VERSION"));

/// Curve classification kept by the rebound merge.
const V_SHAPE: &str = "v_shape";

/// Errors from the remote quote source.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SourceError {
    #[error("request failed: {status} {status_text}")]
    Fetch { status: u16, status_text: String },

    #[error("request failed: {0}")]
    Transport(String),

    #[error("unexpected response: {0}")]
    Schema(String),
}

/// Anything that can price a set of symbols.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    /// Batched metrics lookup. Symbols the source knows nothing about are
    /// simply absent from the result.
    async fn fetch_metrics(&self, symbols: &[Symbol]) -> Result<Vec<MetricRow>, SourceError>;

    /// Server-chosen rebound candidates already merged with their metrics.
    async fn fetch_dashboard(&self) -> Result<Vec<MetricRow>, SourceError>;
}

/// HTTP implementation of [`QuoteSource`].
pub struct RemoteClient {
    client: Client,
    base_url: String,
}

impl RemoteClient {
    /// Create a client for `base_url`; no timeout unless one is given.
    pub fn new(base_url: &str, timeout_secs: Option<u64>) -> Result<Self, SourceError> {
        let mut builder = Client::builder().user_agent(USER_AGENT);
        if let Some(secs) = timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder
            .build()
            .map_err(|e| SourceError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, SourceError> {
        tracing::debug!(%url, "GET");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| SourceError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Fetch {
                status: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or_default().to_string(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| SourceError::Transport(e.to_string()))?;
        serde_json::from_str(&body).map_err(|e| SourceError::Schema(e.to_string()))
    }
}

#[async_trait]
impl QuoteSource for RemoteClient {
    async fn fetch_metrics(&self, symbols: &[Symbol]) -> Result<Vec<MetricRow>, SourceError> {
        if symbols.is_empty() {
            return Ok(Vec::new());
        }

        let joined = symbols
            .iter()
            .map(Symbol::as_str)
            .collect::<Vec<_>>()
            .join(",");
        let url = format!(
            "{}/api/price-performance?symbols={}",
            self.base_url,
            urlencoding::encode(&joined)
        );

        let response: PerformanceResponse = self.get_json(&url).await?;
        let rows: Vec<MetricRow> = response
            .data
            .ok_or_else(|| SourceError::Schema("missing data".to_string()))?
            .into_iter()
            .filter_map(WirePerformance::into_row)
            .collect();

        tracing::debug!(requested = symbols.len(), returned = rows.len(), "fetched metrics");
        Ok(rows)
    }

    async fn fetch_dashboard(&self) -> Result<Vec<MetricRow>, SourceError> {
        let url = format!("{}/api/dashboard", self.base_url);
        let response: DashboardResponse = self.get_json(&url).await?;
        let data = response
            .data
            .ok_or_else(|| SourceError::Schema("missing data".to_string()))?;
        let rebound = data
            .rebound
            .ok_or_else(|| SourceError::Schema("missing data.rebound".to_string()))?;
        let perf = data
            .perf
            .ok_or_else(|| SourceError::Schema("missing data.perf".to_string()))?;

        Ok(merge_rebound(rebound, perf))
    }
}

// Wire structures

#[derive(Debug, Deserialize)]
struct PerformanceResponse {
    data: Option<Vec<WirePerformance>>,
}

#[derive(Debug, Deserialize)]
struct DashboardResponse {
    data: Option<DashboardData>,
}

#[derive(Debug, Deserialize)]
struct DashboardData {
    rebound: Option<Vec<WireCandidate>>,
    perf: Option<Vec<WirePerformance>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WirePerformance {
    symbol: String,
    #[serde(default)]
    perf1d: Option<f64>,
    #[serde(default)]
    perf5d: Option<f64>,
    #[serde(default)]
    perf20d: Option<f64>,
    #[serde(default)]
    perf60d: Option<f64>,
    #[serde(default)]
    rsi_14: Option<f64>,
}

impl WirePerformance {
    fn into_row(self) -> Option<MetricRow> {
        Some(MetricRow {
            symbol: Symbol::parse(&self.symbol)?,
            perf1d: self.perf1d,
            perf5d: self.perf5d,
            perf20d: self.perf20d,
            perf60d: self.perf60d,
            rsi14: self.rsi_14,
            curve_shape: None,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireCandidate {
    symbol: String,
    #[serde(default)]
    curve_shape: Option<String>,
    #[serde(default)]
    rsi_14: Option<f64>,
}

/// Keep `v_shape` candidates and left-join each with its performance row.
///
/// RSI comes from the candidate when it has one. The first occurrence of a
/// duplicated symbol wins.
pub fn merge_rebound(candidates: Vec<WireCandidate>, perf: Vec<WirePerformance>) -> Vec<MetricRow> {
    let mut by_symbol: HashMap<Symbol, MetricRow> = HashMap::new();
    for row in perf.into_iter().filter_map(WirePerformance::into_row) {
        by_symbol.entry(row.symbol.clone()).or_insert(row);
    }

    let mut merged: Vec<MetricRow> = Vec::new();
    for candidate in candidates {
        if candidate.curve_shape.as_deref() != Some(V_SHAPE) {
            continue;
        }
        let Some(symbol) = Symbol::parse(&candidate.symbol) else {
            continue;
        };
        if merged.iter().any(|r| r.symbol == symbol) {
            continue;
        }

        let mut row = by_symbol
            .get(&symbol)
            .cloned()
            .unwrap_or_else(|| MetricRow::empty(symbol));
        if candidate.rsi_14.is_some() {
            row.rsi14 = candidate.rsi_14;
        }
        row.curve_shape = Some("V".to_string());
        merged.push(row);
    }
    merged
}
