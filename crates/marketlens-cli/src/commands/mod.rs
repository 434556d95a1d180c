mod levels;
mod quotes;
mod regimes;

use std::str::FromStr;
use std::sync::Arc;

use marketlens_core::{
    AnalysisRequest, ChartQuoteSource, Granularity, ReqwestHttpClient,
};
use serde_json::Value;

use crate::cli::{Cli, Command, RequestArgs};
use crate::error::CliError;

pub async fn run(cli: &Cli) -> Result<Value, CliError> {
    let source = ChartQuoteSource::new(Arc::new(ReqwestHttpClient::new()))
        .with_timeout_ms(cli.timeout_ms);

    match &cli.command {
        Command::Quotes(args) => quotes::run(source, args).await,
        Command::Levels(args) => levels::run(source, args).await,
        Command::Regimes(args) => regimes::run(source, args).await,
    }
}

/// Validate the shared request window before any pipeline work.
fn parse_request(args: &RequestArgs) -> Result<AnalysisRequest, CliError> {
    let granularity = Granularity::from_str(&args.granularity)?;
    Ok(AnalysisRequest::new(
        &args.symbol,
        &args.start,
        &args.end,
        granularity,
    )?)
}
