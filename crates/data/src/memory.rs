//! In-memory collaborators for tests and embedded use.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::RwLock;

use bubble_radar_core::{PriceSeries, PriceSource};
use bubble_radar_lppl::{CachedAnalysis, ResultStore};

/// Price source backed by preloaded series, one per symbol.
///
/// Cloning shares the underlying data, so a test can append a price day
/// through one handle and observe the refreshed diagnosis through another.
#[derive(Clone, Default)]
pub struct StaticPriceSource {
    inner: Arc<RwLock<HashMap<String, PriceSeries>>>,
}

impl StaticPriceSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the series for its symbol.
    pub async fn insert(&self, series: PriceSeries) {
        self.inner
            .write()
            .await
            .insert(series.symbol.clone(), series);
    }

    /// Appends one observation to an existing symbol.
    ///
    /// # Errors
    /// Returns an error if the symbol is unknown or the appended
    /// observation would break the series invariants.
    pub async fn append(&self, symbol: &str, date: NaiveDate, close: f64) -> Result<()> {
        let mut guard = self.inner.write().await;
        let Some(series) = guard.get(symbol) else {
            bail!("no series for symbol {symbol}");
        };

        let mut dates = series.dates.clone();
        let mut closes = series.closes.clone();
        dates.push(date);
        closes.push(close);

        let updated = PriceSeries::new(symbol, dates, closes)?;
        guard.insert(symbol.to_string(), updated);
        Ok(())
    }
}

#[async_trait]
impl PriceSource for StaticPriceSource {
    async fn daily_closes(
        &self,
        symbol: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<PriceSeries> {
        let guard = self.inner.read().await;
        let Some(series) = guard.get(symbol) else {
            bail!("no series for symbol {symbol}");
        };

        let mut dates = Vec::new();
        let mut closes = Vec::new();
        for (&date, &close) in series.dates.iter().zip(&series.closes) {
            if start.is_some_and(|s| date < s) || end.is_some_and(|e| date > e) {
                continue;
            }
            dates.push(date);
            closes.push(close);
        }

        PriceSeries::new(symbol, dates, closes).map_err(anyhow::Error::from)
    }
}

/// Result store over a shared map, newest analysis per symbol.
#[derive(Clone, Default)]
pub struct InMemoryResultStore {
    inner: Arc<RwLock<HashMap<String, CachedAnalysis>>>,
}

impl InMemoryResultStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of symbols with a cached analysis.
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Returns true when nothing has been cached yet.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Drops the cached analysis for `symbol`, returning whether one
    /// existed.
    pub async fn invalidate(&self, symbol: &str) -> bool {
        self.inner.write().await.remove(symbol).is_some()
    }
}

#[async_trait]
impl ResultStore for InMemoryResultStore {
    async fn latest(&self, symbol: &str) -> Result<Option<CachedAnalysis>> {
        Ok(self.inner.read().await.get(symbol).cloned())
    }

    async fn put(&self, analysis: &CachedAnalysis) -> Result<()> {
        self.inner
            .write()
            .await
            .insert(analysis.symbol.clone(), analysis.clone());
        Ok(())
    }
}
