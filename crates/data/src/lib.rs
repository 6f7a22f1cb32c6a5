//! Concrete price sources and result stores for the diagnosis engine.

pub mod csv_source;
pub mod memory;
pub mod sqlite_store;

pub use csv_source::CsvPriceSource;
pub use memory::{InMemoryResultStore, StaticPriceSource};
pub use sqlite_store::{CacheInfo, SqliteResultStore};
