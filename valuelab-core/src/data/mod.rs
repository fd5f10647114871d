//! Price acquisition, caching and the aligned price table.

pub mod cache;
pub mod circuit_breaker;
pub mod download;
pub mod memo;
pub mod provider;
pub mod synthetic;
pub mod table;
pub mod upload;
pub mod yahoo;

pub use cache::{CacheMeta, CoverageResult, ParquetCache};
pub use circuit_breaker::CircuitBreaker;
pub use download::{download_symbols, DownloadSummary};
pub use memo::{PriceMemo, PriceRequest};
pub use provider::{
    DataError, DataSource, DownloadProgress, FetchResult, PricePoint, PriceProvider,
    StdoutProgress,
};
pub use synthetic::{synthetic_walk, SyntheticProvider};
pub use table::PriceTable;
pub use upload::{load_price_csv, read_price_csv};
pub use yahoo::YahooProvider;
