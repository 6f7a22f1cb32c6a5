//! SQLite-backed result store.
//!
//! Keeps exactly one row per symbol: the newest analysis. The aggregate
//! columns are denormalized for cheap inspection queries; the full report
//! (including per-window parameter vectors) rides along as a JSON payload
//! in the same row, so aggregate and details are replaced as a unit and a
//! reader can never observe a partial update.

use std::str::FromStr;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use bubble_radar_lppl::{CachedAnalysis, ResultStore};

/// Result store over a SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteResultStore {
    pool: SqlitePool,
}

/// Summary of a cached row, without the per-window payload.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CacheInfo {
    pub symbol: String,
    pub analysis_date: NaiveDate,
    pub state: String,
    pub confidence_indicator: f64,
    pub window_min: i64,
    pub window_max: i64,
    pub window_step: i64,
    pub total_windows: i64,
    pub computation_seconds: f64,
    pub created_at: DateTime<Utc>,
}

impl SqliteResultStore {
    /// Connects to `url` (created if missing) and ensures the schema.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or the schema
    /// cannot be created.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("bad database url {url}"))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .context("failed to connect to result database")?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS lppl_analysis (
                symbol TEXT PRIMARY KEY,
                analysis_date TEXT NOT NULL,
                state TEXT NOT NULL,
                confidence_indicator REAL NOT NULL,
                total_windows INTEGER NOT NULL,
                successful_fits INTEGER NOT NULL,
                bubble_windows INTEGER NOT NULL,
                window_min INTEGER NOT NULL,
                window_max INTEGER NOT NULL,
                window_step INTEGER NOT NULL,
                computation_seconds REAL NOT NULL,
                payload TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await
        .context("failed to create lppl_analysis table")?;

        Ok(())
    }

    /// Drops any cached analysis for `symbol`.
    ///
    /// # Errors
    /// Returns an error if the delete fails.
    pub async fn invalidate(&self, symbol: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM lppl_analysis WHERE symbol = ?1")
            .bind(symbol)
            .execute(&self.pool)
            .await
            .context("failed to invalidate cached analysis")?;

        Ok(result.rows_affected())
    }

    /// Summarizes the cached row for `symbol`, if any.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn cache_info(&self, symbol: &str) -> Result<Option<CacheInfo>> {
        let info = sqlx::query_as::<_, CacheInfo>(
            r"
            SELECT symbol, analysis_date, state, confidence_indicator,
                   window_min, window_max, window_step, total_windows,
                   computation_seconds, created_at
            FROM lppl_analysis
            WHERE symbol = ?1
            ",
        )
        .bind(symbol)
        .fetch_optional(&self.pool)
        .await
        .context("failed to query cache info")?;

        Ok(info)
    }
}

#[async_trait]
impl ResultStore for SqliteResultStore {
    async fn latest(&self, symbol: &str) -> Result<Option<CachedAnalysis>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT payload FROM lppl_analysis WHERE symbol = ?1")
                .bind(symbol)
                .fetch_optional(&self.pool)
                .await
                .context("failed to read cached analysis")?;

        match row {
            None => Ok(None),
            Some((payload,)) => {
                let analysis = serde_json::from_str(&payload)
                    .context("corrupt cached analysis payload")?;
                Ok(Some(analysis))
            }
        }
    }

    async fn put(&self, analysis: &CachedAnalysis) -> Result<()> {
        let payload =
            serde_json::to_string(analysis).context("failed to serialize analysis payload")?;
        let report = &analysis.report;

        sqlx::query(
            r"
            INSERT INTO lppl_analysis
            (symbol, analysis_date, state, confidence_indicator, total_windows,
             successful_fits, bubble_windows, window_min, window_max, window_step,
             computation_seconds, payload, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            ON CONFLICT (symbol) DO UPDATE
            SET analysis_date = excluded.analysis_date,
                state = excluded.state,
                confidence_indicator = excluded.confidence_indicator,
                total_windows = excluded.total_windows,
                successful_fits = excluded.successful_fits,
                bubble_windows = excluded.bubble_windows,
                window_min = excluded.window_min,
                window_max = excluded.window_max,
                window_step = excluded.window_step,
                computation_seconds = excluded.computation_seconds,
                payload = excluded.payload,
                created_at = excluded.created_at
            ",
        )
        .bind(&analysis.symbol)
        .bind(analysis.analysis_date)
        .bind(report.state.to_string())
        .bind(report.confidence_indicator)
        .bind(report.total_windows as i64)
        .bind(report.successful_fits as i64)
        .bind(report.bubble_windows as i64)
        .bind(analysis.window_min as i64)
        .bind(analysis.window_max as i64)
        .bind(analysis.window_step as i64)
        .bind(analysis.computation_seconds)
        .bind(&payload)
        .bind(analysis.created_at)
        .execute(&self.pool)
        .await
        .context("failed to persist analysis")?;

        Ok(())
    }
}
