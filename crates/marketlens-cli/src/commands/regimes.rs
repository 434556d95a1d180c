use marketlens_analytics::RegimeDetector;
use marketlens_core::ChartQuoteSource;
use serde_json::{json, Value};

use crate::cli::RegimesArgs;
use crate::commands::parse_request;
use crate::error::CliError;

pub async fn run(source: ChartQuoteSource, args: &RegimesArgs) -> Result<Value, CliError> {
    let request = parse_request(&args.request)?;

    let detector = RegimeDetector::new(source);
    let rows = detector.detect(request, args.regimes).await?;

    Ok(json!({
        "symbol": request.symbol,
        "regimes": rows,
    }))
}
