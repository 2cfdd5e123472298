//! Data export: row dumps for batch mode and the board backup document.

use crate::models::{MetricRow, StarredEntry, Symbol};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Export format type
#[derive(Debug, Clone, Copy)]
pub enum ExportFormat {
    Text,
    Csv,
    Json,
}

/// Export rows in the specified format.
pub fn export_rows(title: &str, rows: &[MetricRow], format: ExportFormat) -> String {
    match format {
        ExportFormat::Text => export_text(title, rows),
        ExportFormat::Csv => export_csv(rows),
        ExportFormat::Json => export_json(rows),
    }
}

/// Export as a plain table.
fn export_text(title: &str, rows: &[MetricRow]) -> String {
    let mut output = String::new();

    output.push_str(&format!("WATCHBOARD - {} ({} symbols)\n", title, rows.len()));
    output.push_str(&format!(
        "{:<10} {:>9} {:>9} {:>9} {:>9} {:>8} {:>5}\n",
        "SYMBOL", "1D%", "5D%", "20D%", "60D%", "RSI14", "CURVE"
    ));
    output.push_str(&"-".repeat(65));
    output.push('\n');

    for row in rows {
        output.push_str(&format!(
            "{:<10} {:>9} {:>9} {:>9} {:>9} {:>8} {:>5}\n",
            row.symbol.as_str(),
            format_percent(row.perf1d),
            format_percent(row.perf5d),
            format_percent(row.perf20d),
            format_percent(row.perf60d),
            format_rsi(row.rsi14),
            row.curve_shape.as_deref().unwrap_or(""),
        ));
    }

    output
}

/// Export as CSV (comma-separated values).
fn export_csv(rows: &[MetricRow]) -> String {
    let mut output = String::new();

    output.push_str("Symbol,Perf1D,Perf5D,Perf20D,Perf60D,RSI14,Curve\n");

    for row in rows {
        output.push_str(&format!(
            "\"{}\",{},{},{},{},{},{}\n",
            row.symbol,
            csv_number(row.perf1d),
            csv_number(row.perf5d),
            csv_number(row.perf20d),
            csv_number(row.perf60d),
            csv_number(row.rsi14),
            row.curve_shape.as_deref().unwrap_or(""),
        ));
    }

    output
}

/// Export as JSON.
fn export_json(rows: &[MetricRow]) -> String {
    match serde_json::to_string_pretty(rows) {
        Ok(json) => json + "\n",
        Err(e) => {
            tracing::error!(error = %e, "failed to serialize rows");
            "[]\n".to_string()
        }
    }
}

/// Signed percentage with two decimals, "-" when unknown.
pub fn format_percent(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:+.2}%", v),
        None => "-".to_string(),
    }
}

/// RSI with three decimals, "-" when unknown.
pub fn format_rsi(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.3}", v),
        None => "-".to_string(),
    }
}

fn csv_number(value: Option<f64>) -> String {
    value.map(|v| format!("{:.2}", v)).unwrap_or_default()
}

/// Backup of the user lists and starred entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoardExport {
    #[serde(default)]
    pub cub: Vec<Symbol>,
    #[serde(default)]
    pub ft: Vec<Symbol>,
    #[serde(default)]
    pub oo: Vec<Symbol>,
    #[serde(default)]
    pub starred: Vec<StarredEntry>,
}

impl BoardExport {
    /// Read a backup (or seed) document.
    pub fn read(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Write the document as pretty JSON.
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(self).context("Failed to serialize export")?;
        fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
    }

    /// Default file name for an export made today.
    pub fn default_file_name() -> String {
        format!("watchboard-export-{}.json", chrono::Local::now().format("%Y-%m-%d"))
    }
}
