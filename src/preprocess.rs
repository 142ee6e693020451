//! Validation and extraction between untyped external data and the
//! indicator core.
//!
//! Everything that arrives from the outside (provider rows, spreadsheet
//! cells) goes through here and comes out either as strict numeric types or
//! as an [`IndicatorError`] naming the first offending element.

use chrono::DateTime;
use error_stack::{Report, bail};
use serde::Deserialize;
use serde_json::Value;

use crate::error::IndicatorError;
use crate::model::{HlcBar, PriceBar, PriceSeries};

/// One bar exactly as decoded from a provider response. Every field may be
/// absent or null.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawBar {
    /// Bar start, milliseconds since the Unix epoch.
    #[serde(rename = "t")]
    pub timestamp: Option<i64>,
    #[serde(rename = "o")]
    pub open: Option<f64>,
    #[serde(rename = "h")]
    pub high: Option<f64>,
    #[serde(rename = "l")]
    pub low: Option<f64>,
    #[serde(rename = "c")]
    pub close: Option<f64>,
    #[serde(rename = "v")]
    pub volume: Option<f64>,
}

/// Map each bar to its close price.
pub fn extract_closes(bars: &[PriceBar]) -> Result<Vec<f64>, Report<IndicatorError>> {
    if bars.is_empty() {
        bail!(IndicatorError::EmptySeries);
    }
    Ok(bars.iter().map(|b| b.close).collect())
}

/// Map each bar to the high/low/close triple.
pub fn extract_hlc(bars: &[PriceBar]) -> Result<Vec<HlcBar>, Report<IndicatorError>> {
    if bars.is_empty() {
        bail!(IndicatorError::EmptySeries);
    }
    Ok(bars.iter().map(PriceBar::hlc).collect())
}

/// Fail on the first element that is not a finite number.
pub fn validate_numeric(series: &[f64]) -> Result<(), Report<IndicatorError>> {
    match series.iter().position(|x| !x.is_finite()) {
        Some(index) => Err(Report::new(IndicatorError::InvalidPrice { index })
            .attach(format!("value: {}", series[index]))),
        None => Ok(()),
    }
}

/// Check `0 < period <= series_len - margin_required` and return the period
/// as a window length.
///
/// `margin_required` is the number of extra points the indicator consumes
/// beyond its window (1 for anything built on day-over-day differences).
pub fn validate_period(
    period: i64,
    series_len: usize,
    margin_required: usize,
) -> Result<usize, Report<IndicatorError>> {
    let max = series_len.saturating_sub(margin_required);
    match usize::try_from(period) {
        Ok(p) if p > 0 && p <= max => Ok(p),
        _ => Err(Report::new(IndicatorError::InvalidPeriod { period, max })
            .attach(format!("series length: {series_len}, margin: {margin_required}"))),
    }
}

/// Build a validated series from decoded provider rows.
///
/// Prices must be present, finite and non-negative. A missing volume is read
/// as zero; a present one must be finite and non-negative and is rounded to
/// whole units.
pub fn bars_from_raw(rows: &[RawBar]) -> Result<PriceSeries, Report<IndicatorError>> {
    if rows.is_empty() {
        bail!(IndicatorError::EmptySeries);
    }

    let bars = rows
        .iter()
        .enumerate()
        .map(|(index, row)| bar_from_raw(index, row))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(PriceSeries::new(bars))
}

fn bar_from_raw(index: usize, row: &RawBar) -> Result<PriceBar, Report<IndicatorError>> {
    let price = |value: Option<f64>, field: &'static str| match value {
        Some(p) if p.is_finite() && p >= 0.0 => Ok(p),
        other => Err(Report::new(IndicatorError::InvalidPrice { index })
            .attach(format!("field {field}: {other:?}"))),
    };

    let timestamp = row
        .timestamp
        .and_then(DateTime::from_timestamp_millis)
        .ok_or_else(|| {
            Report::new(IndicatorError::InvalidPrice { index })
                .attach(format!("timestamp: {:?}", row.timestamp))
        })?;

    let volume = match row.volume {
        None => 0,
        Some(v) if v.is_finite() && v >= 0.0 => v.round() as u64,
        Some(v) => {
            return Err(Report::new(IndicatorError::InvalidPrice { index })
                .attach(format!("field v: {v}")));
        }
    };

    Ok(PriceBar {
        timestamp,
        open: price(row.open, "o")?,
        high: price(row.high, "h")?,
        low: price(row.low, "l")?,
        close: price(row.close, "c")?,
        volume,
    })
}

/// Convert spreadsheet-style cells into a flat price list.
///
/// Accepts numbers and numeric strings; nested arrays (a one-row or
/// one-column range) are flattened in reading order. Null, blank, boolean or
/// non-numeric text fails with the flattened index of the cell.
pub fn prices_from_cells(cells: &[Value]) -> Result<Vec<f64>, Report<IndicatorError>> {
    let mut leaves = Vec::with_capacity(cells.len());
    flatten_cells(cells, &mut leaves);

    if leaves.is_empty() {
        bail!(IndicatorError::EmptySeries);
    }

    let prices = leaves
        .into_iter()
        .enumerate()
        .map(|(index, cell)| {
            cell_number(cell).ok_or_else(|| {
                Report::new(IndicatorError::InvalidPrice { index }).attach(format!("cell: {cell}"))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    validate_numeric(&prices)?;
    Ok(prices)
}

fn flatten_cells<'a>(cells: &'a [Value], out: &mut Vec<&'a Value>) {
    for cell in cells {
        match cell {
            Value::Array(inner) => flatten_cells(inner, out),
            other => out.push(other),
        }
    }
}

fn cell_number(cell: &Value) -> Option<f64> {
    match cell {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|x| x.is_finite()),
        _ => None,
    }
}
