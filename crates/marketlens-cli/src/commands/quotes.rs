use marketlens_core::{ChartQuoteSource, QuoteSource};
use serde_json::{json, Value};

use crate::cli::RequestArgs;
use crate::commands::parse_request;
use crate::error::CliError;

pub async fn run(source: ChartQuoteSource, args: &RequestArgs) -> Result<Value, CliError> {
    let request = parse_request(args)?;
    let series = source.fetch(&request).await?;

    Ok(json!({
        "symbol": request.symbol,
        "data": series.bars(),
    }))
}
