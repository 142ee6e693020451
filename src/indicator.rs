pub mod atr;
pub mod bollinger;
pub mod ma;
pub mod macd;
pub mod rsi;

use error_stack::{Report, bail};

use crate::error::IndicatorError;
use crate::model::{IndicatorKind, IndicatorResult, PriceSeries};
use crate::preprocess::{validate_numeric, validate_period};

pub use atr::{Atr, compute_atr};
pub use bollinger::{BollingerBands, BollingerOutput, compute_bollinger};
pub use ma::{Ema, Sma, compute_ema, compute_sma};
pub use macd::{Macd, MacdOutput, compute_macd};
pub use rsi::{Rsi, RsiSmoothing, compute_rsi, compute_rsi_with};

pub const DEFAULT_MA_PERIOD: i64 = 20;
pub const DEFAULT_RSI_PERIOD: i64 = 14;
pub const DEFAULT_BOLLINGER_PERIOD: i64 = 20;
pub const DEFAULT_STD_DEV_MULTIPLIER: f64 = 2.0;
pub const DEFAULT_ATR_PERIOD: i64 = 14;

/// A technical indicator computed over a whole price series.
///
/// Bars must be in ascending chronological order (oldest first), which
/// [`PriceSeries`] guarantees.
pub trait Indicator: Send + Sync {
    fn kind(&self) -> IndicatorKind;

    /// Display label including parameters, e.g. `RSI(14)`.
    fn label(&self) -> String;

    /// Minimum number of bars required to produce at least one output value.
    fn required_bars(&self) -> usize;

    /// Number of leading input dates that have no output value.
    fn warm_up(&self) -> usize;

    /// Calculate every output channel, each aligned to the series' dates.
    fn calculate(&self, series: &PriceSeries) -> Result<IndicatorResult, Report<IndicatorError>>;
}

/// Caller-supplied tunables. Missing values fall back to per-indicator
/// defaults; MACD periods are fixed at 12/26/9.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct IndicatorParams {
    pub period: Option<i64>,
    pub std_dev_multiplier: Option<f64>,
    pub smoothing: Option<RsiSmoothing>,
}

/// Construct the indicator named by `kind` with defaults substituted.
pub fn build_indicator(
    kind: IndicatorKind,
    params: &IndicatorParams,
) -> Result<Box<dyn Indicator>, Report<IndicatorError>> {
    let indicator: Box<dyn Indicator> = match kind {
        IndicatorKind::Sma => Box::new(Sma::new(params.period.unwrap_or(DEFAULT_MA_PERIOD))),
        IndicatorKind::Ema => Box::new(Ema::new(params.period.unwrap_or(DEFAULT_MA_PERIOD))),
        IndicatorKind::Rsi => Box::new(Rsi::new(
            params.period.unwrap_or(DEFAULT_RSI_PERIOD),
            params.smoothing.unwrap_or_default(),
        )),
        IndicatorKind::Macd => Box::new(Macd::standard()),
        IndicatorKind::Bollinger => Box::new(BollingerBands::new(
            params.period.unwrap_or(DEFAULT_BOLLINGER_PERIOD),
            params
                .std_dev_multiplier
                .unwrap_or(DEFAULT_STD_DEV_MULTIPLIER),
        )?),
        IndicatorKind::Atr => Box::new(Atr::new(params.period.unwrap_or(DEFAULT_ATR_PERIOD))),
    };
    Ok(indicator)
}

/// Shared input checks for the close-price indicators: non-empty, all
/// finite, and `period` within `1..=len - margin`.
fn checked_window(
    prices: &[f64],
    period: usize,
    margin: usize,
) -> Result<usize, Report<IndicatorError>> {
    if prices.is_empty() {
        bail!(IndicatorError::EmptySeries);
    }
    validate_numeric(prices)?;
    validate_period(
        i64::try_from(period).unwrap_or(i64::MAX),
        prices.len(),
        margin,
    )
}

/// Warm-up length for a raw period, saturating negative periods to zero.
fn window_len(period: i64) -> usize {
    usize::try_from(period).unwrap_or(0)
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{Duration, TimeZone, Utc};

    use crate::model::{PriceBar, PriceSeries};

    pub fn series_from_closes(closes: &[f64]) -> PriceSeries {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        PriceSeries::new(
            closes
                .iter()
                .enumerate()
                .map(|(i, &c)| PriceBar {
                    timestamp: start + Duration::days(i as i64),
                    open: c,
                    high: c,
                    low: c,
                    close: c,
                    volume: 1,
                })
                .collect(),
        )
    }

    pub fn assert_close(actual: &[f64], expected: &[f64]) {
        assert_eq!(actual.len(), expected.len(), "{actual:?} vs {expected:?}");
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < 1e-9, "{actual:?} vs {expected:?}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::series_from_closes;
    use super::*;

    fn wave(len: usize) -> Vec<f64> {
        (0..len)
            .map(|i| 100.0 + (i as f64 * 0.7).sin() * 5.0 + i as f64 * 0.1)
            .collect()
    }

    #[test]
    fn build_indicator_substitutes_defaults() {
        let params = IndicatorParams::default();
        assert_eq!(
            build_indicator(IndicatorKind::Rsi, &params).unwrap().label(),
            "RSI(14)"
        );
        assert_eq!(
            build_indicator(IndicatorKind::Sma, &params).unwrap().label(),
            "SMA(20)"
        );
        assert_eq!(
            build_indicator(IndicatorKind::Bollinger, &params)
                .unwrap()
                .label(),
            "BB(20, 2)"
        );
        assert_eq!(
            build_indicator(IndicatorKind::Macd, &params).unwrap().label(),
            "MACD(12, 26, 9)"
        );
        assert_eq!(
            build_indicator(IndicatorKind::Atr, &params).unwrap().label(),
            "ATR(14)"
        );
    }

    #[test]
    fn build_indicator_rejects_negative_multiplier() {
        let params = IndicatorParams {
            std_dev_multiplier: Some(-1.0),
            ..Default::default()
        };
        assert!(build_indicator(IndicatorKind::Bollinger, &params).is_err());
    }

    #[test]
    fn negative_period_reported_as_invalid_period() {
        let params = IndicatorParams {
            period: Some(-5),
            ..Default::default()
        };
        let indicator = build_indicator(IndicatorKind::Sma, &params).unwrap();
        let err = indicator.calculate(&series_from_closes(&wave(10))).unwrap_err();
        assert!(matches!(
            err.current_context(),
            IndicatorError::InvalidPeriod { period: -5, .. }
        ));
    }

    #[test]
    fn every_indicator_is_pure() {
        let series = series_from_closes(&wave(60));
        let kinds = [
            IndicatorKind::Sma,
            IndicatorKind::Ema,
            IndicatorKind::Rsi,
            IndicatorKind::Macd,
            IndicatorKind::Bollinger,
            IndicatorKind::Atr,
        ];
        for kind in kinds {
            let indicator = build_indicator(kind, &IndicatorParams::default()).unwrap();
            let first = indicator.calculate(&series).unwrap();
            let second = indicator.calculate(&series).unwrap();
            assert_eq!(first, second, "{kind} is not deterministic");
        }
    }

    #[test]
    fn every_channel_maps_to_input_dates_after_warm_up() {
        let series = series_from_closes(&wave(60));
        let dates = series.dates();
        let kinds = [
            IndicatorKind::Sma,
            IndicatorKind::Ema,
            IndicatorKind::Rsi,
            IndicatorKind::Macd,
            IndicatorKind::Bollinger,
            IndicatorKind::Atr,
        ];
        for kind in kinds {
            let indicator = build_indicator(kind, &IndicatorParams::default()).unwrap();
            let result = indicator.calculate(&series).unwrap();
            for channel in &result.channels {
                assert_eq!(channel.offset, indicator.warm_up(), "{kind}/{}", channel.name);
                assert_eq!(channel.offset + channel.points.len(), dates.len());
                assert_eq!(channel.points[0].date, dates[channel.offset]);
                assert_eq!(channel.points.last().unwrap().date, *dates.last().unwrap());
            }
        }
    }

    #[test]
    fn required_bars_is_the_minimum_input() {
        let kinds = [
            IndicatorKind::Sma,
            IndicatorKind::Ema,
            IndicatorKind::Rsi,
            IndicatorKind::Macd,
            IndicatorKind::Bollinger,
            IndicatorKind::Atr,
        ];
        for kind in kinds {
            let indicator = build_indicator(kind, &IndicatorParams::default()).unwrap();
            let required = indicator.required_bars();
            let enough = series_from_closes(&wave(required));
            let short = series_from_closes(&wave(required - 1));
            let result = indicator.calculate(&enough).unwrap();
            assert!(result.channels.iter().all(|c| c.points.len() == 1), "{kind}");
            assert!(indicator.calculate(&short).is_err(), "{kind}");
        }
    }

    #[test]
    fn empty_series_is_reported() {
        let indicator = build_indicator(IndicatorKind::Ema, &IndicatorParams::default()).unwrap();
        let err = indicator.calculate(&PriceSeries::default()).unwrap_err();
        assert_eq!(*err.current_context(), IndicatorError::EmptySeries);
    }
}
