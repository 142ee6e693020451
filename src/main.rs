use std::num::NonZeroU32;
use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use derive_more::{Display, Error};
use error_stack::{Report, ResultExt};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use sheet_ta::config::{self, AppConfig};
use sheet_ta::error::IndicatorError;
use sheet_ta::indicator::{IndicatorParams, RsiSmoothing, build_indicator};
use sheet_ta::model::{IndicatorKind, IndicatorResult, PriceSeries, Timespan};
use sheet_ta::provider::batch::fetch_batched;
use sheet_ta::provider::rest::RestProvider;
use sheet_ta::provider::{ApiKey, BarsRequest, MarketDataProvider};
use sheet_ta::table;

#[derive(Debug, Display, Error)]
pub enum AppError {
    #[display("configuration error")]
    Config,
    #[display("invalid argument")]
    Usage,
    #[display("no API key available")]
    Credentials,
    #[display("indicator request failed")]
    Request,
    #[display("failed to write output")]
    Output,
}

#[derive(Parser)]
#[command(
    name = "sheet-ta",
    about = "Technical indicators over market data provider price bars"
)]
struct Cli {
    /// Path to a TOML configuration file; defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Market data provider API key
    #[arg(long, env = "SHEET_TA_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch one ticker and compute one indicator
    Compute {
        #[arg(long)]
        ticker: String,
        /// sma | ema | rsi | macd | bollinger | atr
        #[arg(long)]
        indicator: String,
        #[arg(long, allow_negative_numbers = true)]
        period: Option<i64>,
        #[arg(long)]
        std_dev_multiplier: Option<f64>,
        /// RSI averaging: simple | wilder
        #[arg(long)]
        smoothing: Option<String>,
        /// minute | hour | day | week | month | quarter | year
        #[arg(long, default_value = "day")]
        timespan: String,
        #[arg(long, default_value_t = 1)]
        multiplier: u32,
        /// First date, YYYY-MM-DD
        #[arg(long)]
        from: NaiveDate,
        /// Last date, YYYY-MM-DD
        #[arg(long)]
        to: NaiveDate,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Run every [[watch]] entry from the config file
    Watch {
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() {
    if let Err(report) = run().await {
        eprintln!("{report:?}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Report<AppError>> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => config::load(path).change_context(AppError::Config)?,
        None => AppConfig::default(),
    };

    init_tracing(&config);

    let api_key = resolve_api_key(cli.api_key.as_deref(), &config)?;
    let provider = build_provider(&config, api_key)?;

    match cli.command {
        Command::Compute {
            ticker,
            indicator,
            period,
            std_dev_multiplier,
            smoothing,
            timespan,
            multiplier,
            from,
            to,
            format,
        } => {
            let kind = IndicatorKind::from_str(&indicator)
                .ok_or_else(|| usage(format!("unknown indicator \"{indicator}\"")))?;
            let timespan = Timespan::from_str(&timespan)
                .ok_or_else(|| usage(format!("unknown timespan \"{timespan}\"")))?;
            let smoothing = smoothing
                .map(|s| {
                    RsiSmoothing::from_str(&s)
                        .ok_or_else(|| usage(format!("unknown smoothing \"{s}\"")))
                })
                .transpose()?;
            if from > to {
                return Err(usage(format!("--from {from} is after --to {to}")));
            }

            let request = BarsRequest {
                ticker,
                timespan,
                multiplier,
                from,
                to,
            };
            let params = IndicatorParams {
                period,
                std_dev_multiplier,
                smoothing,
            };
            compute(&provider, &request, kind, &params, format).await
        }
        Command::Watch { format } => watch(&config, &provider, format).await,
    }
}

fn usage(message: String) -> Report<AppError> {
    Report::new(AppError::Usage).attach(message)
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::new(&config.general.log_level);
    // stdout carries the tables
    match config.general.log_format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

/// Command line (or environment) first, then the config file.
fn resolve_api_key(
    cli_key: Option<&str>,
    config: &AppConfig,
) -> Result<ApiKey, Report<AppError>> {
    cli_key
        .and_then(ApiKey::new)
        .or_else(|| config.provider.api_key.clone())
        .ok_or_else(|| {
            Report::new(AppError::Credentials)
                .attach("pass --api-key, set SHEET_TA_API_KEY, or set provider.api_key")
        })
}

fn build_provider(
    config: &AppConfig,
    api_key: ApiKey,
) -> Result<RestProvider, Report<AppError>> {
    let rps = NonZeroU32::new(config.provider.requests_per_second).ok_or_else(|| {
        Report::new(AppError::Config).attach("provider.requests_per_second must be > 0")
    })?;
    Ok(RestProvider::new(&config.provider.base_url, api_key, rps)
        .with_adjusted(config.provider.adjusted))
}

async fn compute(
    provider: &dyn MarketDataProvider,
    request: &BarsRequest,
    kind: IndicatorKind,
    params: &IndicatorParams,
    format: OutputFormat,
) -> Result<(), Report<AppError>> {
    info!(
        ticker = %request.ticker,
        indicator = %kind,
        from = %request.from,
        to = %request.to,
        "computing indicator"
    );

    let series = match provider.fetch_bars(request).await {
        Ok(series) => series,
        Err(e) => {
            println!("{}", table::render_error(&e));
            return Err(e.change_context(AppError::Request));
        }
    };

    match evaluate(&series, kind, params) {
        Ok(result) => print_result(&result, format),
        Err(e) => {
            println!("{}", table::render_error(&e));
            Err(e.change_context(AppError::Request))
        }
    }
}

fn evaluate(
    series: &PriceSeries,
    kind: IndicatorKind,
    params: &IndicatorParams,
) -> Result<IndicatorResult, Report<IndicatorError>> {
    build_indicator(kind, params)?.calculate(series)
}

fn print_result(result: &IndicatorResult, format: OutputFormat) -> Result<(), Report<AppError>> {
    match format {
        OutputFormat::Text => println!("{}", table::to_text(&table::render(result))),
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(result).change_context(AppError::Output)?;
            println!("{json}");
        }
    }
    Ok(())
}

async fn watch(
    config: &AppConfig,
    provider: &dyn MarketDataProvider,
    format: OutputFormat,
) -> Result<(), Report<AppError>> {
    let entries: Vec<_> = config
        .watch
        .iter()
        .filter_map(|entry| Some((entry, entry.kind()?, entry.request()?)))
        .collect();

    if entries.is_empty() {
        warn!("no [[watch]] entries configured; nothing to do");
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl+c received, cancelling remaining batches");
            ctrl_c.cancel();
        }
    });

    let requests: Vec<BarsRequest> = entries.iter().map(|(_, _, r)| r.clone()).collect();
    let policy = config.provider.batch_policy();
    info!(
        entries = requests.len(),
        width = policy.width,
        delay_ms = policy.delay.as_millis() as u64,
        "fetching watch list"
    );

    let fetched = fetch_batched(provider, &requests, policy, &cancel).await;
    let processed = fetched.len();

    let mut failures = 0usize;
    let mut json_entries = Vec::new();
    for ((entry, kind, _), fetched) in entries.iter().zip(fetched) {
        let outcome = fetched
            .map_err(|e| table::render_error(&e))
            .and_then(|series| {
                evaluate(&series, *kind, &entry.indicator_params())
                    .map_err(|e| table::render_error(&e))
            });

        if let Err(diagnostic) = &outcome {
            failures += 1;
            warn!(ticker = %entry.ticker, indicator = %kind, error = %diagnostic, "watch entry failed");
        }

        match format {
            OutputFormat::Text => {
                println!("== {} {} ==", entry.ticker, kind);
                match &outcome {
                    Ok(result) => println!("{}\n", table::to_text(&table::render(result))),
                    Err(diagnostic) => println!("{diagnostic}\n"),
                }
            }
            OutputFormat::Json => json_entries.push(match outcome {
                Ok(result) => serde_json::json!({ "ticker": entry.ticker, "result": result }),
                Err(diagnostic) => serde_json::json!({ "ticker": entry.ticker, "error": diagnostic }),
            }),
        }
    }

    if format == OutputFormat::Json {
        let json = serde_json::to_string_pretty(&json_entries).change_context(AppError::Output)?;
        println!("{json}");
    }

    info!(
        processed,
        skipped = requests.len() - processed,
        failures,
        "watch run complete"
    );
    Ok(())
}
