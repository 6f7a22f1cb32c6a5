//! Diagnosis facade.
//!
//! `DiagnosisEngine` is the single entry point external callers use: it
//! fetches prices, decides cache freshness, runs the multi-window sweep on
//! the blocking pool, persists the result, and assembles the JSON-facing
//! response. The price source and result store are injected, so backtest
//! harnesses and services wire their own.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;

use chrono::{NaiveDate, Utc};

use bubble_radar_core::{AnalysisConfig, DiagnoseError, PriceSource};

use crate::forecast;
use crate::preprocess::{self, PriceWindow};
use crate::response::{
    AnalysisPeriod, CachedAnalysis, DiagnosisResponse, RepresentativeFit, SweepStatistics,
    WindowDetail, WindowRange,
};
use crate::store::ResultStore;
use crate::sweep::MultiWindowAnalyzer;

/// Facade over one price source and one result store.
///
/// A single engine may serve concurrent `diagnose` calls for different
/// symbols; the store is the only shared mutable state and its writes are
/// last-writer-wins per symbol.
pub struct DiagnosisEngine<P, S>
where
    P: PriceSource,
    S: ResultStore,
{
    source: P,
    store: S,
    config: AnalysisConfig,
    cancel: Arc<AtomicBool>,
}

impl<P, S> DiagnosisEngine<P, S>
where
    P: PriceSource,
    S: ResultStore,
{
    /// Creates an engine after validating the configuration.
    ///
    /// # Errors
    /// Returns an error when `config` fails [`AnalysisConfig::validate`].
    pub fn new(source: P, store: S, config: AnalysisConfig) -> anyhow::Result<Self> {
        config.validate()?;
        Ok(Self {
            source,
            store,
            config,
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Cooperative cancellation flag; workers check it between window
    /// fits, so a set flag stops the sweep at the next window boundary.
    #[must_use]
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Active analysis configuration.
    #[must_use]
    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Diagnoses `symbol` up to `end` (defaults to the latest available
    /// price date), serving a cached analysis when it is still fresh.
    ///
    /// `force` bypasses the freshness check but still persists the fresh
    /// result. A failed cache write is not fatal: the response is returned
    /// with `cache_miss_persisted = false`.
    ///
    /// # Errors
    /// See [`DiagnoseError`]; per-window fit failures are never errors.
    pub async fn diagnose(
        &self,
        symbol: &str,
        end: Option<NaiveDate>,
        force: bool,
    ) -> Result<DiagnosisResponse, DiagnoseError> {
        tracing::info!(symbol, force, "running bubble diagnosis");

        let series = self
            .source
            .daily_closes(symbol, None, end)
            .await
            .map_err(|source| DiagnoseError::PriceSource {
                symbol: symbol.to_string(),
                source,
            })?;
        let window = preprocess::prepare(&series)?;
        let latest = window.end_date();

        if !force {
            match self.store.latest(symbol).await {
                Ok(Some(cached))
                    if cached.analysis_date == latest
                        && cached.matches_window_config(&self.config) =>
                {
                    tracing::debug!(
                        symbol,
                        analysis_date = %cached.analysis_date,
                        "serving cached analysis"
                    );
                    return Ok(self.build_response(&window, &cached, true, true));
                }
                Ok(_) => {}
                Err(e) => {
                    // A broken cache read downgrades to a recompute.
                    tracing::warn!(symbol, error = %e, "cache read failed; recomputing");
                }
            }
        }

        let started = Instant::now();
        let analyzer = MultiWindowAnalyzer::new(self.config.clone());
        let cancel = Arc::clone(&self.cancel);
        let task_window = window.clone();
        let report = tokio::task::spawn_blocking(move || analyzer.run(&task_window, &cancel))
            .await
            .expect("sweep task panicked")?;
        let computation_seconds = started.elapsed().as_secs_f64();

        let analysis = CachedAnalysis {
            symbol: symbol.to_string(),
            analysis_date: latest,
            last_price_date: latest,
            window_min: self.config.window_min,
            window_max: self.config.window_max,
            window_step: self.config.window_step,
            report,
            computation_seconds,
            created_at: Utc::now(),
        };

        let persisted = match self.store.put(&analysis).await {
            Ok(()) => true,
            Err(source) => {
                let err = DiagnoseError::CachePersist {
                    symbol: symbol.to_string(),
                    source,
                };
                tracing::warn!(symbol, error = %err, "returning unpersisted analysis");
                false
            }
        };

        Ok(self.build_response(&window, &analysis, false, persisted))
    }

    fn build_response(
        &self,
        window: &PriceWindow,
        analysis: &CachedAnalysis,
        cached: bool,
        persisted: bool,
    ) -> DiagnosisResponse {
        let report = &analysis.report;
        let n = window.len();
        let largest = report.windows.last().map_or(n, |o| o.window_size.min(n));

        let representative_fit = report.representative().and_then(|outcome| {
            let params = outcome.params?;
            let rmse = outcome.rmse?;
            let w = outcome.window_size;
            let start = n.checked_sub(w)?;

            let fitted_points = forecast::fitted_curve(&params, &window.dates[start..]);
            let forecast_points = forecast::forecast_curve(
                &params,
                outcome.end_date,
                w,
                self.config.forecast_days,
            );

            let days_to_critical = ((params.tc - (w - 1) as f64) * 10.0).round() / 10.0;
            let critical_date = (days_to_critical > 0.0).then(|| {
                forecast::add_business_days(outcome.end_date, days_to_critical.round() as usize)
            });

            Some(RepresentativeFit {
                parameters: params,
                window_size: w,
                rmse,
                days_to_critical,
                critical_date,
                fitted_points,
                forecast_points,
            })
        });

        DiagnosisResponse {
            symbol: analysis.symbol.clone(),
            state: report.state,
            confidence_indicator: report.confidence_indicator,
            message: report.state.message().to_string(),
            analysis_period: AnalysisPeriod {
                start: window.dates[n - largest],
                end: window.end_date(),
                days: largest,
            },
            window_range: WindowRange {
                min: analysis.window_min,
                max: analysis.window_max,
                step: analysis.window_step,
            },
            statistics: SweepStatistics {
                total_windows: report.total_windows,
                successful_fits: report.successful_fits,
                bubble_windows: report.bubble_windows,
                success_rate: report.success_rate,
            },
            representative_fit,
            detailed_results: report
                .windows
                .iter()
                .map(|o| WindowDetail {
                    window_size: o.window_size,
                    success: o.success,
                    is_bubble: o.is_bubble,
                })
                .collect(),
            timed_out: report.timed_out,
            cached,
            cache_miss_persisted: persisted,
            computation_seconds: if cached {
                None
            } else {
                Some(analysis.computation_seconds)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LpplParams;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use bubble_radar_core::PriceSeries;
    use chrono::Duration;
    use std::collections::HashMap;
    use tokio::sync::RwLock;

    // ============================================
    // Test Doubles
    // ============================================

    /// Price source over a shared, mutable series so tests can append days.
    #[derive(Clone)]
    struct SharedSource {
        inner: Arc<RwLock<PriceSeries>>,
    }

    #[async_trait]
    impl PriceSource for SharedSource {
        async fn daily_closes(
            &self,
            _symbol: &str,
            _start: Option<NaiveDate>,
            end: Option<NaiveDate>,
        ) -> Result<PriceSeries> {
            let series = self.inner.read().await.clone();
            match end {
                None => Ok(series),
                Some(end) => {
                    let keep = series.dates.iter().filter(|d| **d <= end).count();
                    PriceSeries::new(
                        series.symbol.clone(),
                        series.dates[..keep].to_vec(),
                        series.closes[..keep].to_vec(),
                    )
                    .map_err(|e| anyhow!(e))
                }
            }
        }
    }

    #[derive(Clone, Default)]
    struct MapStore {
        inner: Arc<RwLock<HashMap<String, CachedAnalysis>>>,
    }

    #[async_trait]
    impl ResultStore for MapStore {
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

    /// Store whose writes always fail; reads succeed with nothing cached.
    struct BrokenStore;

    #[async_trait]
    impl ResultStore for BrokenStore {
        async fn latest(&self, _symbol: &str) -> Result<Option<CachedAnalysis>> {
            Ok(None)
        }

        async fn put(&self, _analysis: &CachedAnalysis) -> Result<()> {
            Err(anyhow!("store unavailable"))
        }
    }

    // ============================================
    // Fixtures
    // ============================================

    fn test_config() -> AnalysisConfig {
        AnalysisConfig::default()
            .with_window_range(30, 60, 10)
            .with_workers(2)
            .with_seed(42)
    }

    fn business_days(start: NaiveDate, n: usize) -> Vec<NaiveDate> {
        let mut dates = Vec::with_capacity(n);
        let mut current = start;
        for _ in 0..n {
            dates.push(current);
            current = forecast::next_business_day(current);
        }
        dates
    }

    fn bubble_series(n: usize) -> PriceSeries {
        let params = LpplParams {
            tc: (n - 1) as f64 + 30.0,
            m: 0.4,
            omega: 8.0,
            a: 5.0,
            b: -0.25,
            c1: 0.03,
            c2: 0.02,
        };
        let closes = (0..n)
            .map(|t| params.log_price_at(t as f64).unwrap().exp())
            .collect();
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        PriceSeries::new("TEST", business_days(start, n), closes).unwrap()
    }

    fn engine_with(
        series: PriceSeries,
        store: MapStore,
    ) -> (DiagnosisEngine<SharedSource, MapStore>, SharedSource) {
        let source = SharedSource {
            inner: Arc::new(RwLock::new(series)),
        };
        let engine = DiagnosisEngine::new(source.clone(), store, test_config()).unwrap();
        (engine, source)
    }

    // ============================================
    // Cache Protocol Tests
    // ============================================

    #[tokio::test]
    async fn second_call_is_served_from_cache() {
        let (engine, _source) = engine_with(bubble_series(80), MapStore::default());

        let first = engine.diagnose("TEST", None, false).await.unwrap();
        assert!(!first.cached);
        assert!(first.cache_miss_persisted);
        assert!(first.computation_seconds.is_some());

        let second = engine.diagnose("TEST", None, false).await.unwrap();
        assert!(second.cached);
        assert!(second.computation_seconds.is_none());

        // Identical payload apart from the cache flags.
        assert_eq!(first.state, second.state);
        assert_eq!(first.confidence_indicator, second.confidence_indicator);
        assert_eq!(first.statistics, second.statistics);
        assert_eq!(first.detailed_results, second.detailed_results);
        assert_eq!(first.analysis_period, second.analysis_period);
    }

    #[tokio::test]
    async fn appended_price_day_invalidates_cache() {
        let (engine, source) = engine_with(bubble_series(80), MapStore::default());

        let first = engine.diagnose("TEST", None, false).await.unwrap();
        let first_end = first.analysis_period.end;

        {
            let mut series = source.inner.write().await;
            let next_date = forecast::next_business_day(first_end);
            let next_close = *series.closes.last().unwrap() * 1.01;
            series.dates.push(next_date);
            series.closes.push(next_close);
        }

        let second = engine.diagnose("TEST", None, false).await.unwrap();
        assert!(!second.cached);
        assert_eq!(
            second.analysis_period.end,
            forecast::next_business_day(first_end)
        );
    }

    #[tokio::test]
    async fn force_bypasses_fresh_cache() {
        let (engine, _source) = engine_with(bubble_series(80), MapStore::default());

        engine.diagnose("TEST", None, false).await.unwrap();
        let forced = engine.diagnose("TEST", None, true).await.unwrap();

        assert!(!forced.cached);
        assert!(forced.cache_miss_persisted);
    }

    #[tokio::test]
    async fn failed_write_is_reported_but_not_fatal() {
        let source = SharedSource {
            inner: Arc::new(RwLock::new(bubble_series(80))),
        };
        let engine = DiagnosisEngine::new(source, BrokenStore, test_config()).unwrap();

        let response = engine.diagnose("TEST", None, false).await.unwrap();

        assert!(!response.cached);
        assert!(!response.cache_miss_persisted);
        assert!(response.statistics.successful_fits > 0);
    }

    #[tokio::test]
    async fn end_date_limits_the_series() {
        let (engine, _source) = engine_with(bubble_series(80), MapStore::default());

        let full = engine.diagnose("TEST", None, false).await.unwrap();
        let cutoff = full.analysis_period.end - Duration::days(30);
        let truncated = engine.diagnose("TEST", Some(cutoff), true).await.unwrap();

        assert!(truncated.analysis_period.end <= cutoff);
    }

    // ============================================
    // Response Shape Tests
    // ============================================

    #[tokio::test]
    async fn bubble_series_produces_representative_fit() {
        let (engine, _source) = engine_with(bubble_series(80), MapStore::default());

        let response = engine.diagnose("TEST", None, false).await.unwrap();

        assert!(response.confidence_indicator >= 60.0);
        let fit = response.representative_fit.expect("representative fit");
        assert_eq!(fit.fitted_points.len(), fit.window_size);
        assert!(!fit.forecast_points.is_empty());
        assert!(fit.days_to_critical > 0.0);
        assert!(fit.critical_date.is_some());

        // The forecast never reaches the critical time.
        let horizon = fit.window_size + fit.forecast_points.len();
        assert!((horizon as f64) < fit.parameters.tc.floor() + 1.0);
    }

    #[tokio::test]
    async fn short_series_is_rejected() {
        let (engine, _source) = engine_with(bubble_series(80), MapStore::default());

        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let short = PriceSeries::new("TEST", business_days(start, 29), vec![100.0; 29]).unwrap();
        {
            let mut series = engine.source.inner.write().await;
            *series = short;
        }

        let err = engine.diagnose("TEST", None, false).await.unwrap_err();
        assert!(matches!(err, DiagnoseError::InsufficientData { observations: 29, .. }));
    }

    #[tokio::test]
    async fn config_validation_happens_at_construction() {
        let source = SharedSource {
            inner: Arc::new(RwLock::new(bubble_series(80))),
        };
        let config = test_config().with_window_range(60, 30, 5);
        assert!(DiagnosisEngine::new(source, MapStore::default(), config).is_err());
    }
}
