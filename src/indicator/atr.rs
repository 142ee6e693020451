use error_stack::{Report, bail};

use crate::error::IndicatorError;
use crate::indicator::{Indicator, mean, window_len};
use crate::model::{Channel, HlcBar, IndicatorKind, IndicatorResult, PriceSeries};
use crate::preprocess::{extract_hlc, validate_period};

/// Average True Range with Wilder smoothing.
///
/// True range exists from the second bar on. The first ATR is the mean of
/// the first `period` true ranges and belongs to bar index `period`; output
/// length is `len - period`.
pub fn compute_atr(bars: &[HlcBar], period: usize) -> Result<Vec<f64>, Report<IndicatorError>> {
    if bars.is_empty() {
        bail!(IndicatorError::EmptySeries);
    }
    if let Some(index) = bars
        .iter()
        .position(|b| !(b.high.is_finite() && b.low.is_finite() && b.close.is_finite()))
    {
        return Err(Report::new(IndicatorError::InvalidPrice { index })
            .attach(format!("bar: {:?}", bars[index])));
    }
    let period = validate_period(i64::try_from(period).unwrap_or(i64::MAX), bars.len(), 1)?;

    let true_ranges: Vec<f64> = bars
        .windows(2)
        .map(|w| true_range(&w[1], w[0].close))
        .collect();

    let n = period as f64;
    let mut atr = mean(&true_ranges[..period]);
    let mut results = Vec::with_capacity(true_ranges.len() - period + 1);
    results.push(atr);

    for &tr in &true_ranges[period..] {
        atr = (atr * (n - 1.0) + tr) / n;
        results.push(atr);
    }

    Ok(results)
}

fn true_range(bar: &HlcBar, prev_close: f64) -> f64 {
    let hl = bar.high - bar.low;
    let hc = (bar.high - prev_close).abs();
    let lc = (bar.low - prev_close).abs();
    hl.max(hc).max(lc)
}

pub struct Atr {
    period: i64,
}

impl Atr {
    pub fn new(period: i64) -> Self {
        Self { period }
    }
}

impl Indicator for Atr {
    fn kind(&self) -> IndicatorKind {
        IndicatorKind::Atr
    }

    fn label(&self) -> String {
        format!("ATR({})", self.period)
    }

    fn required_bars(&self) -> usize {
        window_len(self.period).max(1) + 1
    }

    fn warm_up(&self) -> usize {
        window_len(self.period)
    }

    fn calculate(&self, series: &PriceSeries) -> Result<IndicatorResult, Report<IndicatorError>> {
        let bars = extract_hlc(series.bars())?;
        let period = validate_period(self.period, bars.len(), 1)?;
        let values = compute_atr(&bars, period)?;
        Ok(IndicatorResult {
            indicator: self.label(),
            channels: vec![Channel::aligned("atr", &series.dates(), values)],
        })
    }
}
