//! Result-store seam consumed by the diagnosis facade.

use anyhow::Result;
use async_trait::async_trait;

use crate::response::CachedAnalysis;

/// Persistent store of the newest analysis per symbol.
///
/// Writes are atomic at the `(symbol, analysis_date)` key: a reader never
/// observes an aggregate without its per-window details, and a new
/// analysis date replaces any prior record for the symbol. Under
/// concurrent writers for the same symbol, last writer wins.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Loads the most recent cached analysis for `symbol`, if any.
    async fn latest(&self, symbol: &str) -> Result<Option<CachedAnalysis>>;

    /// Persists `analysis`, replacing any prior record for its symbol.
    async fn put(&self, analysis: &CachedAnalysis) -> Result<()>;
}
