use std::str::FromStr;

use marketlens_analytics::LevelEstimator;
use marketlens_core::{ArchModelKind, ChartQuoteSource, DistributionKind};
use serde_json::{json, Value};

use crate::cli::LevelsArgs;
use crate::commands::parse_request;
use crate::error::CliError;

pub async fn run(source: ChartQuoteSource, args: &LevelsArgs) -> Result<Value, CliError> {
    let model = ArchModelKind::from_str(&args.model)?;
    let distribution = DistributionKind::from_str(&args.distribution)?;
    let request = parse_request(&args.request)?;

    let estimator = LevelEstimator::new(source);
    let rows = estimator
        .estimate(request, model, distribution, args.levels)
        .await?;

    Ok(json!({
        "symbol": request.symbol,
        "garch_levels": rows,
    }))
}
