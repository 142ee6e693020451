use std::time::Duration;

use error_stack::Report;
use futures::future::join_all;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::ProviderError;
use crate::model::PriceSeries;
use crate::provider::{BarsRequest, MarketDataProvider};

/// How many requests run at once and how long to pause between groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchPolicy {
    pub width: usize,
    pub delay: Duration,
}

impl Default for BatchPolicy {
    fn default() -> Self {
        Self {
            width: 5,
            delay: Duration::from_secs(1),
        }
    }
}

/// Fetch every request in groups of `policy.width`, pausing `policy.delay`
/// between groups.
///
/// Results come back in request order. A failed request does not affect the
/// others. Once `cancel` fires no further group is started, so the returned
/// vector may be shorter than `requests`.
pub async fn fetch_batched(
    provider: &dyn MarketDataProvider,
    requests: &[BarsRequest],
    policy: BatchPolicy,
    cancel: &CancellationToken,
) -> Vec<Result<PriceSeries, Report<ProviderError>>> {
    let width = policy.width.max(1);
    let mut results = Vec::with_capacity(requests.len());

    for (index, batch) in requests.chunks(width).enumerate() {
        if index > 0 {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {}
                _ = sleep(policy.delay) => {}
            }
        }
        if cancel.is_cancelled() {
            info!(
                completed = results.len(),
                total = requests.len(),
                "batch fetch cancelled"
            );
            break;
        }

        debug!(batch = index, size = batch.len(), "fetching batch");
        let fetched = join_all(batch.iter().map(|request| provider.fetch_bars(request))).await;
        results.extend(fetched);
    }

    results
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::NaiveDate;
    use futures::future::BoxFuture;

    use super::*;
    use crate::indicator::test_support::series_from_closes;
    use crate::model::Timespan;

    /// In-memory provider: tickers starting with `FAIL` error, `STOP`
    /// cancels the token, everything else returns one bar per character.
    struct FakeProvider {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        calls: Mutex<Vec<String>>,
        cancel: CancellationToken,
    }

    impl FakeProvider {
        fn new(cancel: CancellationToken) -> Self {
            Self {
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                calls: Mutex::new(Vec::new()),
                cancel,
            }
        }
    }

    impl MarketDataProvider for FakeProvider {
        fn fetch_bars<'a>(
            &'a self,
            request: &'a BarsRequest,
        ) -> BoxFuture<'a, Result<PriceSeries, Report<ProviderError>>> {
            Box::pin(async move {
                let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                self.max_in_flight.fetch_max(now, Ordering::SeqCst);
                self.calls.lock().unwrap().push(request.ticker.clone());

                sleep(Duration::from_millis(5)).await;
                self.in_flight.fetch_sub(1, Ordering::SeqCst);

                if request.ticker.starts_with("STOP") {
                    self.cancel.cancel();
                }
                if request.ticker.starts_with("FAIL") {
                    return Err(Report::new(ProviderError::Status { code: 404 }));
                }
                Ok(series_from_closes(&vec![1.0; request.ticker.len()]))
            })
        }
    }

    fn requests(tickers: &[&str]) -> Vec<BarsRequest> {
        let from = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let to = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        tickers
            .iter()
            .map(|t| BarsRequest::new(*t, Timespan::Day, from, to))
            .collect()
    }

    fn policy(width: usize) -> BatchPolicy {
        BatchPolicy {
            width,
            delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn results_keep_request_order() {
        let cancel = CancellationToken::new();
        let provider = FakeProvider::new(cancel.clone());
        let reqs = requests(&["A", "BB", "CCC", "DDDD", "EEEEE"]);

        let results = fetch_batched(&provider, &reqs, policy(2), &cancel).await;

        let lens: Vec<usize> = results.iter().map(|r| r.as_ref().unwrap().len()).collect();
        assert_eq!(lens, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn concurrency_bounded_by_width() {
        let cancel = CancellationToken::new();
        let provider = FakeProvider::new(cancel.clone());
        let reqs = requests(&["A", "B", "C", "D", "E", "F", "G"]);

        fetch_batched(&provider, &reqs, policy(3), &cancel).await;

        assert_eq!(provider.calls.lock().unwrap().len(), 7);
        assert!(provider.max_in_flight.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn failure_is_isolated() {
        let cancel = CancellationToken::new();
        let provider = FakeProvider::new(cancel.clone());
        let reqs = requests(&["AA", "FAIL", "CC"]);

        let results = fetch_batched(&provider, &reqs, policy(2), &cancel).await;

        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(matches!(
            results[1].as_ref().unwrap_err().current_context(),
            ProviderError::Status { code: 404 }
        ));
        assert!(results[2].is_ok());
    }

    #[tokio::test]
    async fn cancellation_stops_remaining_batches() {
        let cancel = CancellationToken::new();
        let provider = FakeProvider::new(cancel.clone());
        let reqs = requests(&["STOP", "B", "C", "D"]);

        let results = fetch_batched(&provider, &reqs, policy(2), &cancel).await;

        assert_eq!(results.len(), 2);
        assert_eq!(*provider.calls.lock().unwrap(), vec!["STOP", "B"]);
    }

    #[tokio::test]
    async fn cancelled_before_start_fetches_nothing() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let provider = FakeProvider::new(cancel.clone());

        let results = fetch_batched(&provider, &requests(&["A"]), policy(1), &cancel).await;

        assert!(results.is_empty());
        assert!(provider.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn zero_width_treated_as_one() {
        let cancel = CancellationToken::new();
        let provider = FakeProvider::new(cancel.clone());

        let results = fetch_batched(&provider, &requests(&["A", "B"]), policy(0), &cancel).await;

        assert_eq!(results.len(), 2);
        assert_eq!(provider.max_in_flight.load(Ordering::SeqCst), 1);
    }
}
