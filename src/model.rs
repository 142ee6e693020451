use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

/// Bar aggregation unit understood by the market data provider.
///
/// String representations match both the config file and the provider's URL
/// path segment (e.g. `"day"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timespan {
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Quarter,
    Year,
}

impl Timespan {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "minute" => Some(Self::Minute),
            "hour" => Some(Self::Hour),
            "day" => Some(Self::Day),
            "week" => Some(Self::Week),
            "month" => Some(Self::Month),
            "quarter" => Some(Self::Quarter),
            "year" => Some(Self::Year),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Minute => "minute",
            Self::Hour => "hour",
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
            Self::Quarter => "quarter",
            Self::Year => "year",
        }
    }
}

impl fmt::Display for Timespan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndicatorKind {
    Sma,
    Ema,
    Rsi,
    Macd,
    Bollinger,
    Atr,
}

impl IndicatorKind {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sma" => Some(Self::Sma),
            "ema" => Some(Self::Ema),
            "rsi" => Some(Self::Rsi),
            "macd" => Some(Self::Macd),
            "bollinger" | "bbands" => Some(Self::Bollinger),
            "atr" => Some(Self::Atr),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sma => "sma",
            Self::Ema => "ema",
            Self::Rsi => "rsi",
            Self::Macd => "macd",
            Self::Bollinger => "bollinger",
            Self::Atr => "atr",
        }
    }
}

impl fmt::Display for IndicatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One OHLCV observation. Built by the preprocessor, never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceBar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl PriceBar {
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }

    pub fn hlc(&self) -> HlcBar {
        HlcBar {
            high: self.high,
            low: self.low,
            close: self.close,
        }
    }
}

/// The high/low/close triple ATR works on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HlcBar {
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

/// Bars in ascending timestamp order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceSeries {
    bars: Vec<PriceBar>,
}

impl PriceSeries {
    /// Sorts `bars` by timestamp. Duplicate timestamps are kept in input order.
    pub fn new(mut bars: Vec<PriceBar>) -> Self {
        bars.sort_by_key(|b| b.timestamp);
        Self { bars }
    }

    pub fn bars(&self) -> &[PriceBar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.bars.iter().map(PriceBar::date).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DatedValue {
    pub date: NaiveDate,
    pub value: f64,
}

/// One output line of an indicator, e.g. the signal line of MACD.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Channel {
    pub name: String,
    /// Index into the input dates of the first value.
    pub offset: usize,
    pub points: Vec<DatedValue>,
}

impl Channel {
    /// Pair `values` with the trailing dates: the last value belongs to the
    /// last date, and `offset` is the number of leading dates left without a
    /// value.
    ///
    /// `values` never outnumber `dates` for an indicator output; any excess
    /// leading values are dropped.
    pub fn aligned(name: impl Into<String>, dates: &[NaiveDate], values: Vec<f64>) -> Self {
        let offset = dates.len().saturating_sub(values.len());
        let skip = values.len().saturating_sub(dates.len());
        let points = dates[offset..]
            .iter()
            .zip(values.into_iter().skip(skip))
            .map(|(&date, value)| DatedValue { date, value })
            .collect();
        Self {
            name: name.into(),
            offset,
            points,
        }
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndicatorResult {
    pub indicator: String,
    pub channels: Vec<Channel>,
}

impl IndicatorResult {
    pub fn channel(&self, name: &str) -> Option<&Channel> {
        self.channels.iter().find(|c| c.name == name)
    }
}
