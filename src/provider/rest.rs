use std::num::NonZeroU32;
use std::sync::Arc;

use error_stack::{Report, ResultExt};
use futures::future::BoxFuture;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use nonzero_ext::nonzero;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::ProviderError;
use crate::model::PriceSeries;
use crate::preprocess::{RawBar, bars_from_raw};
use crate::provider::{ApiKey, BarsRequest, MarketDataProvider};

pub const DEFAULT_BASE_URL: &str = "https://api.polygon.io";
pub const DEFAULT_REQUESTS_PER_SECOND: NonZeroU32 = nonzero!(5u32);
const MAX_BARS_PER_REQUEST: u32 = 50_000;

/// Aggregate-bars client for the provider's REST API.
pub struct RestProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: ApiKey,
    adjusted: bool,
    rate_limiter: Arc<DefaultDirectRateLimiter>,
}

impl RestProvider {
    pub fn new(
        base_url: impl Into<String>,
        api_key: ApiKey,
        requests_per_second: NonZeroU32,
    ) -> Self {
        let base_url: String = base_url.into();
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_owned(),
            api_key,
            adjusted: true,
            rate_limiter: Arc::new(RateLimiter::direct(Quota::per_second(requests_per_second))),
        }
    }

    /// Request split-adjusted (default) or raw bars.
    pub fn with_adjusted(mut self, adjusted: bool) -> Self {
        self.adjusted = adjusted;
        self
    }

    fn bars_url(&self, request: &BarsRequest) -> String {
        format!(
            "{}/v2/aggs/ticker/{}/range/{}/{}/{}/{}",
            self.base_url,
            request.ticker,
            request.multiplier,
            request.timespan,
            request.from.format("%Y-%m-%d"),
            request.to.format("%Y-%m-%d"),
        )
    }
}

impl MarketDataProvider for RestProvider {
    fn fetch_bars<'a>(
        &'a self,
        request: &'a BarsRequest,
    ) -> BoxFuture<'a, Result<PriceSeries, Report<ProviderError>>> {
        Box::pin(async move {
            // Wait for rate limiter before making the request
            self.rate_limiter.until_ready().await;

            let url = self.bars_url(request);
            debug!(ticker = %request.ticker, url = %url, "requesting aggregate bars");

            let adjusted = self.adjusted.to_string();
            let limit = MAX_BARS_PER_REQUEST.to_string();
            let params = [
                ("adjusted", adjusted.as_str()),
                ("sort", "asc"),
                ("limit", limit.as_str()),
            ];

            // header, not query: request URLs end up in error reports
            let response = self
                .client
                .get(&url)
                .query(&params)
                .bearer_auth(self.api_key.expose())
                .send()
                .await
                .change_context(ProviderError::Request)
                .attach_with(|| format!("ticker: {}", request.ticker))?;

            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS {
                return Err(Report::new(ProviderError::RateLimit)
                    .attach(format!("ticker: {}", request.ticker)));
            }
            if !status.is_success() {
                return Err(Report::new(ProviderError::Status {
                    code: status.as_u16(),
                })
                .attach(format!("ticker: {}", request.ticker)));
            }

            let body = response
                .text()
                .await
                .change_context(ProviderError::ResponseParse)?;
            let series =
                decode_aggregates(&body).attach_with(|| format!("ticker: {}", request.ticker))?;

            info!(
                ticker = %request.ticker,
                timespan = %request.timespan,
                bars = series.len(),
                "aggregate bars fetched"
            );

            Ok(series)
        })
    }
}

/// Aggregates response body: `{ "status": "OK", "results": [ {t,o,h,l,c,v}, ... ] }`.
#[derive(Debug, Deserialize)]
struct AggregatesResponse {
    status: Option<String>,
    #[serde(default)]
    results: Option<Vec<RawBar>>,
    error: Option<String>,
    message: Option<String>,
}

/// Decode a response body and validate its rows into a series.
///
/// An `ERROR` status becomes [`ProviderError::Provider`]; absent `results`
/// is an empty series, which the preprocessor rejects.
fn decode_aggregates(body: &str) -> Result<PriceSeries, Report<ProviderError>> {
    let response: AggregatesResponse =
        serde_json::from_str(body).change_context(ProviderError::ResponseParse)?;

    if response.status.as_deref() == Some("ERROR") {
        let message = response
            .error
            .or(response.message)
            .unwrap_or_else(|| "unknown error".into());
        return Err(Report::new(ProviderError::Provider { message }));
    }

    let rows = response.results.unwrap_or_default();
    bars_from_raw(&rows).change_context(ProviderError::Series)
}
