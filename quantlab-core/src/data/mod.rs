//! Data acquisition: provider trait, incremental Parquet cache, remote
//! chart provider, synthetic spread construction.

pub mod cache;
pub mod provider;
pub mod remote;
pub mod synthetic;

pub use cache::{BarCache, CacheMeta};
pub use provider::{
    DataError, DataProvider, DataSource, FetchResult, FixtureProvider, LoadProgress,
    SilentProgress,
};
pub use remote::ChartApiProvider;
pub use synthetic::{spread_table, SpreadKind, SyntheticError};
