//! Display formatting for indicator results and failures.

use std::error::Error;

use error_stack::Report;

use crate::error::IndicatorError;
use crate::model::IndicatorResult;

/// Header row plus one row per output date.
///
/// Rows start at the earliest first value of any channel; a channel with a
/// longer warm-up shows empty cells until its own first value.
pub fn render(result: &IndicatorResult) -> Vec<Vec<String>> {
    let mut header = vec!["Date".to_owned()];
    if result.channels.len() == 1 {
        header.push(result.indicator.clone());
    } else {
        header.extend(result.channels.iter().map(|c| c.name.clone()));
    }

    let start = result.channels.iter().map(|c| c.offset).min().unwrap_or(0);
    let end = result
        .channels
        .iter()
        .map(|c| c.offset + c.points.len())
        .max()
        .unwrap_or(0);

    let mut rows = vec![header];
    for index in start..end {
        let date = result
            .channels
            .iter()
            .find_map(|c| index.checked_sub(c.offset).and_then(|i| c.points.get(i)))
            .map(|p| p.date);
        let Some(date) = date else { continue };

        let mut row = vec![date.format("%Y-%m-%d").to_string()];
        row.extend(result.channels.iter().map(|c| {
            index
                .checked_sub(c.offset)
                .and_then(|i| c.points.get(i))
                .map(|p| format!("{:.4}", p.value))
                .unwrap_or_default()
        }));
        rows.push(row);
    }
    rows
}

/// One-line diagnostic for a failed calculation or fetch.
///
/// When an indicator precondition failure sits underneath a higher-level
/// error, both are shown.
pub fn render_error<C>(report: &Report<C>) -> String
where
    C: Error + Send + Sync + 'static,
{
    let mut message = report.current_context().to_string();
    if let Some(inner) = report.downcast_ref::<IndicatorError>() {
        let inner = inner.to_string();
        if inner != message {
            message = format!("{message}: {inner}");
        }
    }
    format!("#ERROR: {message}")
}

/// Lay rows out in aligned columns: the first column left-aligned, the rest
/// right-aligned.
pub fn to_text(rows: &[Vec<String>]) -> String {
    let columns = rows.iter().map(Vec::len).max().unwrap_or(0);
    let widths: Vec<usize> = (0..columns)
        .map(|col| {
            rows.iter()
                .filter_map(|r| r.get(col))
                .map(|cell| cell.chars().count())
                .max()
                .unwrap_or(0)
        })
        .collect();

    rows.iter()
        .map(|row| {
            row.iter()
                .enumerate()
                .map(|(col, cell)| {
                    if col == 0 {
                        format!("{cell:<width$}", width = widths[col])
                    } else {
                        format!("{cell:>width$}", width = widths[col])
                    }
                })
                .collect::<Vec<_>>()
                .join("  ")
                .trim_end()
                .to_owned()
        })
        .collect::<Vec<_>>()
        .join("\n")
}
