use error_stack::{Report, bail};

use crate::error::IndicatorError;
use crate::indicator::{Indicator, compute_ema};
use crate::model::{Channel, IndicatorKind, IndicatorResult, PriceSeries};
use crate::preprocess::{extract_closes, validate_numeric};

pub const FAST_PERIOD: usize = 12;
pub const SLOW_PERIOD: usize = 26;
pub const SIGNAL_PERIOD: usize = 9;

/// Three equal-length MACD channels.
#[derive(Debug, Clone, PartialEq)]
pub struct MacdOutput {
    pub macd_line: Vec<f64>,
    pub signal_line: Vec<f64>,
    pub histogram: Vec<f64>,
}

impl MacdOutput {
    /// Index into the input prices of the first output value.
    pub fn offset(&self, input_len: usize) -> usize {
        input_len - self.histogram.len()
    }
}

/// Minimum input length that yields one MACD value. Saturates at
/// `usize::MAX` for periods no series can satisfy.
pub fn required_len(slow_period: usize, signal_period: usize) -> usize {
    slow_period
        .saturating_add(signal_period)
        .saturating_sub(1)
        .max(slow_period.saturating_add(1))
}

/// MACD line, signal line and histogram.
///
/// The MACD line is `EMA(fast) - EMA(slow)` with the longer fast EMA trimmed
/// to the slow one; the signal line is an EMA of the MACD line. All three
/// channels are trimmed to the signal line's length, so the first value sits
/// at input index `slow_period + signal_period - 2`.
pub fn compute_macd(
    prices: &[f64],
    fast_period: usize,
    slow_period: usize,
    signal_period: usize,
) -> Result<MacdOutput, Report<IndicatorError>> {
    if prices.is_empty() {
        bail!(IndicatorError::EmptySeries);
    }
    validate_numeric(prices)?;

    for period in [fast_period, slow_period, signal_period] {
        if period == 0 {
            bail!(IndicatorError::InvalidPeriod {
                period: 0,
                max: prices.len(),
            });
        }
    }
    if slow_period <= fast_period {
        bail!(IndicatorError::InvalidOrdering {
            fast: fast_period,
            slow: slow_period,
        });
    }

    let required = required_len(slow_period, signal_period);
    if prices.len() <= slow_period || prices.len() - slow_period + 1 < signal_period {
        bail!(IndicatorError::InsufficientData {
            required,
            available: prices.len(),
        });
    }

    let fast_ema = compute_ema(prices, fast_period)?;
    let slow_ema = compute_ema(prices, slow_period)?;

    // fast_ema is longer by (slow_period - fast_period) leading elements
    let offset = fast_ema.len() - slow_ema.len();
    let macd_line: Vec<f64> = fast_ema[offset..]
        .iter()
        .zip(&slow_ema)
        .map(|(f, s)| f - s)
        .collect();

    let signal_line = compute_ema(&macd_line, signal_period)?;
    let signal_offset = macd_line.len() - signal_line.len();
    let macd_line = macd_line[signal_offset..].to_vec();
    let histogram: Vec<f64> = macd_line
        .iter()
        .zip(&signal_line)
        .map(|(m, s)| m - s)
        .collect();

    Ok(MacdOutput {
        macd_line,
        signal_line,
        histogram,
    })
}

/// Moving Average Convergence Divergence of close prices.
#[derive(Debug)]
pub struct Macd {
    fast_period: usize,
    slow_period: usize,
    signal_period: usize,
}

impl Macd {
    pub fn new(
        fast_period: usize,
        slow_period: usize,
        signal_period: usize,
    ) -> Result<Self, Report<IndicatorError>> {
        for period in [fast_period, slow_period, signal_period] {
            if period == 0 {
                // no series yet, so no upper bound
                bail!(IndicatorError::InvalidPeriod {
                    period: 0,
                    max: usize::MAX,
                });
            }
        }
        if fast_period >= slow_period {
            bail!(IndicatorError::InvalidOrdering {
                fast: fast_period,
                slow: slow_period,
            });
        }
        Ok(Self {
            fast_period,
            slow_period,
            signal_period,
        })
    }

    /// The fixed 12/26/9 configuration.
    pub fn standard() -> Self {
        Self {
            fast_period: FAST_PERIOD,
            slow_period: SLOW_PERIOD,
            signal_period: SIGNAL_PERIOD,
        }
    }
}

impl Indicator for Macd {
    fn kind(&self) -> IndicatorKind {
        IndicatorKind::Macd
    }

    fn label(&self) -> String {
        format!(
            "MACD({}, {}, {})",
            self.fast_period, self.slow_period, self.signal_period
        )
    }

    fn required_bars(&self) -> usize {
        required_len(self.slow_period, self.signal_period)
    }

    fn warm_up(&self) -> usize {
        self.slow_period
            .saturating_add(self.signal_period)
            .saturating_sub(2)
    }

    fn calculate(&self, series: &PriceSeries) -> Result<IndicatorResult, Report<IndicatorError>> {
        let closes = extract_closes(series.bars())?;
        let output = compute_macd(
            &closes,
            self.fast_period,
            self.slow_period,
            self.signal_period,
        )?;

        let dates = series.dates();
        Ok(IndicatorResult {
            indicator: self.label(),
            channels: vec![
                Channel::aligned("macd", &dates, output.macd_line),
                Channel::aligned("signal", &dates, output.signal_line),
                Channel::aligned("histogram", &dates, output.histogram),
            ],
        })
    }
}
