use error_stack::{Report, bail};

use crate::error::IndicatorError;
use crate::indicator::{Indicator, checked_window, compute_sma, window_len};
use crate::model::{Channel, IndicatorKind, IndicatorResult, PriceSeries};
use crate::preprocess::{extract_closes, validate_period};

#[derive(Debug, Clone, PartialEq)]
pub struct BollingerOutput {
    pub middle: Vec<f64>,
    pub upper: Vec<f64>,
    pub lower: Vec<f64>,
}

/// Bollinger Bands over each `period`-long window, aligned like SMA.
///
/// Uses the population standard deviation (divisor `period`).
pub fn compute_bollinger(
    prices: &[f64],
    period: usize,
    std_dev_multiplier: f64,
) -> Result<BollingerOutput, Report<IndicatorError>> {
    check_multiplier(std_dev_multiplier)?;
    let period = checked_window(prices, period, 0)?;

    let middle = compute_sma(prices, period)?;
    let mut upper = Vec::with_capacity(middle.len());
    let mut lower = Vec::with_capacity(middle.len());

    for (window, &mean) in prices.windows(period).zip(&middle) {
        let variance = window.iter().map(|&p| (p - mean).powi(2)).sum::<f64>() / period as f64;
        let std_dev = variance.sqrt();
        upper.push(mean + std_dev * std_dev_multiplier);
        lower.push(mean - std_dev * std_dev_multiplier);
    }

    Ok(BollingerOutput {
        middle,
        upper,
        lower,
    })
}

fn check_multiplier(std_dev_multiplier: f64) -> Result<(), Report<IndicatorError>> {
    if !std_dev_multiplier.is_finite() || std_dev_multiplier < 0.0 {
        bail!(IndicatorError::InvalidParameter {
            name: format!("std_dev_multiplier must be a finite number >= 0, got {std_dev_multiplier}"),
        });
    }
    Ok(())
}

pub struct BollingerBands {
    period: i64,
    std_dev_multiplier: f64,
}

impl BollingerBands {
    pub fn new(period: i64, std_dev_multiplier: f64) -> Result<Self, Report<IndicatorError>> {
        check_multiplier(std_dev_multiplier)?;
        Ok(Self {
            period,
            std_dev_multiplier,
        })
    }
}

impl Indicator for BollingerBands {
    fn kind(&self) -> IndicatorKind {
        IndicatorKind::Bollinger
    }

    fn label(&self) -> String {
        format!("BB({}, {})", self.period, self.std_dev_multiplier)
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
        let bands = compute_bollinger(&closes, period, self.std_dev_multiplier)?;

        let dates = series.dates();
        Ok(IndicatorResult {
            indicator: self.label(),
            channels: vec![
                Channel::aligned("middle", &dates, bands.middle),
                Channel::aligned("upper", &dates, bands.upper),
                Channel::aligned("lower", &dates, bands.lower),
            ],
        })
    }
}
