//! Data acquisition and caching

pub mod cache;
pub mod csv_import;
pub mod provider;
pub mod reconcile;
pub mod store;
pub mod synthetic;

pub use cache::{merge_bars, CacheStatus, FetchReport, TimeSeriesCache};
pub use csv_import::{write_csv, CsvProvider};
pub use provider::{DataError, DataProvider};
pub use reconcile::{reconcile, Coverage, Interval, IntervalError, Reconciliation};
pub use store::{CacheStore, CachedSeries, MemoryStore, ParquetStore, SeriesKey};
pub use synthetic::SyntheticProvider;
