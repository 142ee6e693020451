use derive_more::{Display, Error};

#[derive(Debug, Display, Error)]
pub enum ConfigError {
    #[display("failed to read config file")]
    ReadFile,
    #[display("failed to parse config: {reason}")]
    Parse { reason: String },
    #[display("invalid config: {field}")]
    Validation { field: String },
}

#[derive(Debug, Display, Error)]
pub enum ProviderError {
    #[display("request to market data provider failed")]
    Request,
    #[display("market data provider returned HTTP {code}")]
    Status { code: u16 },
    #[display("rate limit exceeded")]
    RateLimit,
    #[display("failed to parse market data response")]
    ResponseParse,
    #[display("market data provider error: {message}")]
    Provider { message: String },
    #[display("market data response is not a usable price series")]
    Series,
}

/// Precondition failures of the indicator core.
///
/// Every variant is detected before any computation starts.
#[derive(Debug, Clone, PartialEq, Display, Error)]
pub enum IndicatorError {
    #[display("empty series: no data to compute on")]
    EmptySeries,
    #[display("invalid price at index {index}")]
    InvalidPrice { index: usize },
    #[display("invalid period {period}: must be between 1 and {max}")]
    InvalidPeriod { period: i64, max: usize },
    #[display("invalid ordering: fast period {fast} must be less than slow period {slow}")]
    InvalidOrdering { fast: usize, slow: usize },
    #[display("insufficient data: need {required}, got {available}")]
    InsufficientData { required: usize, available: usize },
    #[display("invalid parameter: {name}")]
    InvalidParameter { name: String },
}
