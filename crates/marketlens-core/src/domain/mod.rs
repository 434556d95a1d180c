mod bar;
mod date;
mod granularity;
mod model;
mod request;
mod symbol;

pub use bar::{PriceBar, QuoteSeries};
pub use date::{BarTimestamp, IsoDate, UtcDateTime};
pub use granularity::Granularity;
pub use model::{ArchModelKind, DistributionKind};
pub use request::AnalysisRequest;
pub use symbol::TickerSymbol;
