//! CSV-backed price source.
//!
//! Loads a `date,symbol,close` file eagerly, keeps rows grouped by symbol
//! in chronological order, and serves [`PriceSeries`] slices on demand.
//! Prices are parsed as decimals and converted to floats at this boundary;
//! all downstream analysis is `f64`.

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use bubble_radar_core::{PriceSeries, PriceSource};

/// Price source over a CSV file of daily closes.
///
/// Expected columns (with header): `date,symbol,close`, dates as
/// `YYYY-MM-DD`.
pub struct CsvPriceSource {
    by_symbol: HashMap<String, Vec<(NaiveDate, f64)>>,
}

impl CsvPriceSource {
    /// Loads all rows from `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened, a row is malformed,
    /// or a close is not a positive decimal.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = csv::Reader::from_path(path)
            .with_context(|| format!("failed to open {}", path.display()))?;

        let mut by_symbol: HashMap<String, Vec<(NaiveDate, f64)>> = HashMap::new();
        for (index, result) in reader.records().enumerate() {
            let record = result.with_context(|| format!("bad CSV record at row {}", index + 2))?;
            if record.len() < 3 {
                bail!("row {} has {} columns, expected 3", index + 2, record.len());
            }

            let date = NaiveDate::parse_from_str(&record[0], "%Y-%m-%d")
                .with_context(|| format!("bad date {:?} at row {}", &record[0], index + 2))?;
            let symbol = record[1].to_string();
            let close = Decimal::from_str(record[2].trim())
                .with_context(|| format!("bad close {:?} at row {}", &record[2], index + 2))?;
            let Some(close) = close.to_f64() else {
                bail!("close {close} at row {} does not fit in a float", index + 2);
            };

            by_symbol.entry(symbol).or_default().push((date, close));
        }

        for rows in by_symbol.values_mut() {
            rows.sort_by_key(|(date, _)| *date);
        }

        tracing::debug!(symbols = by_symbol.len(), "loaded CSV price file");
        Ok(Self { by_symbol })
    }

    /// Symbols present in the file.
    #[must_use]
    pub fn symbols(&self) -> Vec<&str> {
        self.by_symbol.keys().map(String::as_str).collect()
    }
}

#[async_trait]
impl PriceSource for CsvPriceSource {
    async fn daily_closes(
        &self,
        symbol: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<PriceSeries> {
        let Some(rows) = self.by_symbol.get(symbol) else {
            bail!("no rows for symbol {symbol}");
        };

        let mut dates = Vec::new();
        let mut closes = Vec::new();
        for &(date, close) in rows {
            if start.is_some_and(|s| date < s) || end.is_some_and(|e| date > e) {
                continue;
            }
            dates.push(date);
            closes.push(close);
        }

        PriceSeries::new(symbol, dates, closes).map_err(anyhow::Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp_csv(name: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("bubble_radar_{name}_{}.csv", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[tokio::test]
    async fn loads_and_serves_one_symbol() {
        let path = write_temp_csv(
            "basic",
            "date,symbol,close\n\
             2024-01-02,AAPL,185.64\n\
             2024-01-03,AAPL,184.25\n\
             2024-01-04,AAPL,181.91\n",
        );
        let source = CsvPriceSource::from_path(&path).unwrap();

        let series = source.daily_closes("AAPL", None, None).await.unwrap();
        assert_eq!(series.len(), 3);
        assert!((series.closes[0] - 185.64).abs() < 1e-9);

        std::fs::remove_file(path).ok();
    }

    #[tokio::test]
    async fn out_of_order_rows_are_sorted() {
        let path = write_temp_csv(
            "unsorted",
            "date,symbol,close\n\
             2024-01-04,AAPL,181.91\n\
             2024-01-02,AAPL,185.64\n\
             2024-01-03,AAPL,184.25\n",
        );
        let source = CsvPriceSource::from_path(&path).unwrap();

        let series = source.daily_closes("AAPL", None, None).await.unwrap();
        assert_eq!(
            series.dates,
            vec![
                NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
                NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(),
                NaiveDate::from_ymd_opt(2024, 1, 4).unwrap(),
            ]
        );

        std::fs::remove_file(path).ok();
    }

    #[tokio::test]
    async fn date_range_filters_inclusively() {
        let path = write_temp_csv(
            "range",
            "date,symbol,close\n\
             2024-01-02,AAPL,185.64\n\
             2024-01-03,AAPL,184.25\n\
             2024-01-04,AAPL,181.91\n\
             2024-01-05,AAPL,181.18\n",
        );
        let source = CsvPriceSource::from_path(&path).unwrap();

        let series = source
            .daily_closes(
                "AAPL",
                NaiveDate::from_ymd_opt(2024, 1, 3),
                NaiveDate::from_ymd_opt(2024, 1, 4),
            )
            .await
            .unwrap();
        assert_eq!(series.len(), 2);

        std::fs::remove_file(path).ok();
    }

    #[tokio::test]
    async fn unknown_symbol_is_an_error() {
        let path = write_temp_csv("missing", "date,symbol,close\n2024-01-02,AAPL,185.64\n");
        let source = CsvPriceSource::from_path(&path).unwrap();

        assert!(source.daily_closes("TSLA", None, None).await.is_err());

        std::fs::remove_file(path).ok();
    }

    #[tokio::test]
    async fn duplicate_dates_are_rejected_at_series_construction() {
        let path = write_temp_csv(
            "dupes",
            "date,symbol,close\n\
             2024-01-02,AAPL,185.64\n\
             2024-01-02,AAPL,185.70\n",
        );
        let source = CsvPriceSource::from_path(&path).unwrap();

        assert!(source.daily_closes("AAPL", None, None).await.is_err());

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn malformed_close_fails_loading() {
        let path = write_temp_csv("badclose", "date,symbol,close\n2024-01-02,AAPL,not-a-price\n");
        assert!(CsvPriceSource::from_path(&path).is_err());
        std::fs::remove_file(path).ok();
    }
}
