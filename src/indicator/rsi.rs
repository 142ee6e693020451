use error_stack::Report;

use crate::error::IndicatorError;
use crate::indicator::{Indicator, checked_window, mean, window_len};
use crate::model::{Channel, IndicatorKind, IndicatorResult, PriceSeries};
use crate::preprocess::{extract_closes, validate_period};

/// How average gain and loss are carried from one window to the next.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RsiSmoothing {
    /// Plain mean over each sliding window of `period` changes.
    #[default]
    Simple,
    /// Seed with the plain mean, then `avg = (avg * (period - 1) + x) / period`.
    Wilder,
}

impl RsiSmoothing {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "simple" => Some(Self::Simple),
            "wilder" => Some(Self::Wilder),
            _ => None,
        }
    }
}

/// RSI with simple sliding-window averages.
///
/// The first value uses the changes between prices `0..=period` and belongs
/// to input index `period`; output length is `len - period`.
pub fn compute_rsi(prices: &[f64], period: usize) -> Result<Vec<f64>, Report<IndicatorError>> {
    compute_rsi_with(prices, period, RsiSmoothing::Simple)
}

pub fn compute_rsi_with(
    prices: &[f64],
    period: usize,
    smoothing: RsiSmoothing,
) -> Result<Vec<f64>, Report<IndicatorError>> {
    let period = checked_window(prices, period, 1)?;

    let deltas: Vec<f64> = prices.windows(2).map(|w| w[1] - w[0]).collect();
    let gains: Vec<f64> = deltas.iter().map(|&d| d.max(0.0)).collect();
    let losses: Vec<f64> = deltas.iter().map(|&d| (-d).max(0.0)).collect();

    let values = match smoothing {
        RsiSmoothing::Simple => gains
            .windows(period)
            .zip(losses.windows(period))
            .map(|(g, l)| rsi_value(mean(g), mean(l)))
            .collect(),
        RsiSmoothing::Wilder => {
            let mut avg_gain = mean(&gains[..period]);
            let mut avg_loss = mean(&losses[..period]);
            let mut results = Vec::with_capacity(deltas.len() - period + 1);
            results.push(rsi_value(avg_gain, avg_loss));

            let n = period as f64;
            for (&gain, &loss) in gains[period..].iter().zip(&losses[period..]) {
                avg_gain = (avg_gain * (n - 1.0) + gain) / n;
                avg_loss = (avg_loss * (n - 1.0) + loss) / n;
                results.push(rsi_value(avg_gain, avg_loss));
            }
            results
        }
    };

    Ok(values)
}

/// Zero average loss is treated as maximal strength, not as undefined.
fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    100.0 - 100.0 / (1.0 + rs)
}

/// Relative Strength Index of close prices.
pub struct Rsi {
    period: i64,
    smoothing: RsiSmoothing,
}

impl Rsi {
    pub fn new(period: i64, smoothing: RsiSmoothing) -> Self {
        Self { period, smoothing }
    }
}

impl Indicator for Rsi {
    fn kind(&self) -> IndicatorKind {
        IndicatorKind::Rsi
    }

    fn label(&self) -> String {
        match self.smoothing {
            RsiSmoothing::Simple => format!("RSI({})", self.period),
            RsiSmoothing::Wilder => format!("RSI({}, wilder)", self.period),
        }
    }

    fn required_bars(&self) -> usize {
        window_len(self.period).max(1) + 1
    }

    fn warm_up(&self) -> usize {
        window_len(self.period)
    }

    fn calculate(&self, series: &PriceSeries) -> Result<IndicatorResult, Report<IndicatorError>> {
        let closes = extract_closes(series.bars())?;
        let period = validate_period(self.period, closes.len(), 1)?;
        let values = compute_rsi_with(&closes, period, self.smoothing)?;
        Ok(IndicatorResult {
            indicator: self.label(),
            channels: vec![Channel::aligned("rsi", &series.dates(), values)],
        })
    }
}
