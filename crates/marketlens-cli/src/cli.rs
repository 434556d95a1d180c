//! CLI argument definitions for marketlens.
//!
//! | Command   | Description                                          |
//! |-----------|------------------------------------------------------|
//! | `quotes`  | Fetch historical OHLCV bars                          |
//! | `levels`  | Estimate volatility levels from an ARCH-family model |
//! | `regimes` | Detect market regimes with a Gaussian HMM            |

use clap::{Args, Parser, Subcommand};

/// marketlens - volatility levels and market regimes over historical quotes.
#[derive(Debug, Parser)]
#[command(
    name = "marketlens",
    author,
    version,
    about = "Volatility levels and market-regime analytics for a fixed symbol universe"
)]
pub struct Cli {
    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Provider request timeout in milliseconds.
    #[arg(long, global = true, default_value_t = 5_000)]
    pub timeout_ms: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch historical OHLCV bars for one symbol.
    Quotes(RequestArgs),
    /// Estimate symmetric volatility price levels.
    Levels(LevelsArgs),
    /// Detect volatility-ordered market regimes.
    Regimes(RegimesArgs),
}

/// Shared request window arguments.
#[derive(Debug, Args)]
pub struct RequestArgs {
    /// Ticker symbol (AAPL, MSFT, GOOGL, AMZN, TSLA).
    pub symbol: String,

    /// Window start, inclusive (YYYY-MM-DD).
    #[arg(long)]
    pub start: String,

    /// Window end, inclusive (YYYY-MM-DD).
    #[arg(long)]
    pub end: String,

    /// Sampling granularity (1d, 15m, 1mo).
    #[arg(long, default_value = "1d")]
    pub granularity: String,
}

#[derive(Debug, Args)]
pub struct LevelsArgs {
    #[command(flatten)]
    pub request: RequestArgs,

    /// Conditional-variance model family (GARCH, EGARCH, FIGARCH).
    #[arg(long, default_value = "GARCH")]
    pub model: String,

    /// Residual distribution (normal, studentst, ged).
    #[arg(long, default_value = "normal")]
    pub distribution: String,

    /// Number of symmetric level pairs to project.
    #[arg(long, default_value_t = 3)]
    pub levels: u32,
}

#[derive(Debug, Args)]
pub struct RegimesArgs {
    #[command(flatten)]
    pub request: RequestArgs,

    /// Number of latent regimes to fit.
    #[arg(long, default_value_t = 3)]
    pub regimes: usize,
}
