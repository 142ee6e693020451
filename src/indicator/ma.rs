use error_stack::Report;

use crate::error::IndicatorError;
use crate::indicator::{Indicator, checked_window, mean, window_len};
use crate::model::{Channel, IndicatorKind, IndicatorResult, PriceSeries};
use crate::preprocess::{extract_closes, validate_period};

/// Arithmetic mean of each `period`-long window.
///
/// Output element `j` belongs to input index `j + period - 1`.
pub fn compute_sma(prices: &[f64], period: usize) -> Result<Vec<f64>, Report<IndicatorError>> {
    let period = checked_window(prices, period, 0)?;
    Ok(prices.windows(period).map(mean).collect())
}

/// Exponential moving average seeded with the SMA of the first `period`
/// prices.
///
/// The seed sits at input index `period - 1`; every later value is
/// `(price - prev) * 2 / (period + 1) + prev`.
pub fn compute_ema(prices: &[f64], period: usize) -> Result<Vec<f64>, Report<IndicatorError>> {
    let period = checked_window(prices, period, 0)?;

    let k = 2.0 / (period as f64 + 1.0);
    let mut ema = mean(&prices[..period]);
    let mut results = Vec::with_capacity(prices.len() - period + 1);
    results.push(ema);

    for &price in &prices[period..] {
        ema += (price - ema) * k;
        results.push(ema);
    }

    Ok(results)
}

/// Simple Moving Average of close prices.
pub struct Sma {
    period: i64,
}

impl Sma {
    pub fn new(period: i64) -> Self {
        Self { period }
    }
}

impl Indicator for Sma {
    fn kind(&self) -> IndicatorKind {
        IndicatorKind::Sma
    }

    fn label(&self) -> String {
        format!("SMA({})", self.period)
    }

    fn required_bars(&self) -> usize {
        window_len(self.period).max(1)
    }

    fn warm_up(&self) -> usize {
        window_len(self.period).saturating_sub(1)
    }

    fn calculate(&self, series: &PriceSeries) -> Result<IndicatorResult, Report<IndicatorError>> {
        let closes = extract_closes(series.bars())?;
        let period = validate_period(self.period, closes.len(), 0)?;
        let values = compute_sma(&closes, period)?;
        Ok(IndicatorResult {
            indicator: self.label(),
            channels: vec![Channel::aligned("sma", &series.dates(), values)],
        })
    }
}

/// Exponential Moving Average of close prices.
pub struct Ema {
    period: i64,
}

impl Ema {
    pub fn new(period: i64) -> Self {
        Self { period }
    }
}

impl Indicator for Ema {
    fn kind(&self) -> IndicatorKind {
        IndicatorKind::Ema
    }

    fn label(&self) -> String {
        format!("EMA({})", self.period)
    }

    fn required_bars(&self) -> usize {
        window_len(self.period).max(1)
    }

    fn warm_up(&self) -> usize {
        window_len(self.period).saturating_sub(1)
    }

    fn calculate(&self, series: &PriceSeries) -> Result<IndicatorResult, Report<IndicatorError>> {
        let closes = extract_closes(series.bars())?;
        let period = validate_period(self.period, closes.len(), 0)?;
        let values = compute_ema(&closes, period)?;
        Ok(IndicatorResult {
            indicator: self.label(),
            channels: vec![Channel::aligned("ema", &series.dates(), values)],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicator::test_support::{assert_close, series_from_closes};

    #[test]
    fn sma_known_value() {
        let values = compute_sma(&[1.0, 2.0, 3.0, 4.0, 5.0], 3).unwrap();
        assert_close(&values, &[2.0, 3.0, 4.0]);
    }

    #[test]
    fn sma_period_equal_to_length() {
        let values = compute_sma(&[1.0, 2.0, 3.0], 3).unwrap();
        assert_close(&values, &[2.0]);
    }

    #[test]
    fn sma_period_too_long_invalid() {
        let err = compute_sma(&[1.0, 2.0, 3.0], 5).unwrap_err();
        assert_eq!(
            *err.current_context(),
            IndicatorError::InvalidPeriod { period: 5, max: 3 }
        );
    }

    #[test]
    fn sma_period_zero_invalid() {
        let err = compute_sma(&[1.0, 2.0, 3.0], 0).unwrap_err();
        assert!(matches!(
            err.current_context(),
            IndicatorError::InvalidPeriod { period: 0, .. }
        ));
    }

    #[test]
    fn sma_rejects_nan() {
        let err = compute_sma(&[1.0, f64::NAN, 3.0], 2).unwrap_err();
        assert_eq!(
            *err.current_context(),
            IndicatorError::InvalidPrice { index: 1 }
        );
    }

    #[test]
    fn sma_empty_series() {
        let err = compute_sma(&[], 1).unwrap_err();
        assert_eq!(*err.current_context(), IndicatorError::EmptySeries);
    }

    #[test]
    fn ema_seed_equals_sma_then_recurses() {
        let values = compute_ema(&[1.0, 2.0, 3.0, 4.0, 5.0], 3).unwrap();
        // seed = (1+2+3)/3 = 2, then (4-2)*0.5+2 = 3, (5-3)*0.5+3 = 4
        assert_close(&values, &[2.0, 3.0, 4.0]);
    }

    #[test]
    fn ema_flat_prices() {
        let values = compute_ema(&[10.0; 6], 3).unwrap();
        assert_close(&values, &[10.0; 4]);
    }

    #[test]
    fn ema_period_one_is_identity() {
        let prices = [3.0, 1.0, 4.0, 1.0, 5.0];
        assert_close(&compute_ema(&prices, 1).unwrap(), &prices);
    }

    #[test]
    fn ema_accepts_negative_values() {
        // MACD feeds its own (possibly negative) line back into the EMA.
        let values = compute_ema(&[-1.0, -2.0, -3.0], 2).unwrap();
        assert_close(&values, &[-1.5, -2.5]);
    }

    #[test]
    fn sma_indicator_aligns_dates() {
        let series = series_from_closes(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        let result = Sma::new(3).calculate(&series).unwrap();
        let channel = result.channel("sma").unwrap();
        assert_eq!(result.indicator, "SMA(3)");
        assert_eq!(channel.offset, 2);
        assert_eq!(channel.points[0].date, series.dates()[2]);
        assert_close(&channel.values(), &[2.0, 3.0, 4.0]);
    }

    #[test]
    fn ema_indicator_insufficient_series() {
        let series = series_from_closes(&[1.0; 4]);
        let err = Ema::new(5).calculate(&series).unwrap_err();
        assert!(matches!(
            err.current_context(),
            IndicatorError::InvalidPeriod { period: 5, max: 4 }
        ));
    }
}
