use crate::series::PriceSeries;
use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

/// Upstream feed of daily closing prices.
///
/// Implementations must return business days in ascending order with
/// strictly positive closes; [`PriceSeries::new`] enforces this when the
/// series is built.
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Fetches daily closes for a symbol, optionally bounded by an
    /// inclusive date range.
    async fn daily_closes(
        &self,
        symbol: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<PriceSeries>;
}
