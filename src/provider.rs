pub mod batch;
pub mod rest;

use std::fmt;

use chrono::NaiveDate;
use error_stack::Report;
use futures::future::BoxFuture;
use serde::Deserialize;

use crate::error::ProviderError;
use crate::model::{PriceSeries, Timespan};

/// Credential for the market data provider.
///
/// Passed explicitly to the provider that needs it; `Debug` never prints
/// the key.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct ApiKey(String);

impl ApiKey {
    /// Returns `None` for a blank key.
    pub fn new(key: impl Into<String>) -> Option<Self> {
        let key = key.into().trim().to_owned();
        (!key.is_empty()).then_some(Self(key))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ApiKey {
    type Error = &'static str;

    fn try_from(key: String) -> Result<Self, Self::Error> {
        Self::new(key).ok_or("api key must not be blank")
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(****)")
    }
}

/// Historical bars for one ticker over an inclusive date range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BarsRequest {
    pub ticker: String,
    pub timespan: Timespan,
    /// Size of each bar in `timespan` units (e.g. 5 x minute).
    pub multiplier: u32,
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl BarsRequest {
    pub fn new(
        ticker: impl Into<String>,
        timespan: Timespan,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Self {
        Self {
            ticker: ticker.into(),
            timespan,
            multiplier: 1,
            from,
            to,
        }
    }
}

/// Source of historical price bars.
///
/// Uses `BoxFuture` so the trait stays object-safe (`dyn MarketDataProvider`).
pub trait MarketDataProvider: Send + Sync {
    /// Fetch and validate the bars described by `request`, oldest first.
    fn fetch_bars<'a>(
        &'a self,
        request: &'a BarsRequest,
    ) -> BoxFuture<'a, Result<PriceSeries, Report<ProviderError>>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_key_debug_is_redacted() {
        let key = ApiKey::new("secret-value").unwrap();
        assert_eq!(format!("{key:?}"), "ApiKey(****)");
        assert_eq!(key.expose(), "secret-value");
    }

    #[test]
    fn blank_api_key_rejected() {
        assert!(ApiKey::new("   ").is_none());
        assert!(ApiKey::new("").is_none());
    }

    #[test]
    fn bars_request_defaults_multiplier() {
        let from = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let to = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        let request = BarsRequest::new("AAPL", Timespan::Day, from, to);
        assert_eq!(request.multiplier, 1);
        assert_eq!(request.ticker, "AAPL");
    }
}
