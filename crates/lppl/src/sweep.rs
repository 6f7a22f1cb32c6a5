//! Multi-window confidence analysis.
//!
//! Sweeps trailing windows of increasing size over the tail of a price
//! history, fits each one independently, and condenses the results into
//! the LPPLS confidence indicator: the fraction of successful fits whose
//! parameters satisfy the bubble conditions. Single fits are noisy; the
//! fraction across a hundred-odd windows is the robust signal.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use bubble_radar_core::{AnalysisConfig, DiagnoseError, Stage};

use crate::classify::{self, BubbleState};
use crate::fit::{fit_window, FitConfig};
use crate::model::LpplParams;
use crate::preprocess::{PriceWindow, MIN_OBSERVATIONS};

/// Sweeps with at least this many successful fits may return a partial
/// report on timeout instead of failing.
const MIN_FITS_FOR_PARTIAL: usize = 10;

/// Result of fitting and classifying one sweep window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowOutcome {
    /// Window length in observations.
    pub window_size: usize,
    /// First trading day of the window.
    pub start_date: NaiveDate,
    /// Last trading day of the window (shared by all sweep windows).
    pub end_date: NaiveDate,
    /// Whether the fit succeeded.
    pub success: bool,
    /// Whether the fitted parameters satisfy all four bubble conditions.
    pub is_bubble: bool,
    /// Fitted parameters; present only on success.
    pub params: Option<LpplParams>,
    /// Root-mean-square residual; present only on success.
    pub rmse: Option<f64>,
    /// Fraction of the four bubble conditions satisfied, scaled to 100.
    pub fit_confidence: f64,
}

impl WindowOutcome {
    fn unfitted(window_size: usize, start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            window_size,
            start_date,
            end_date,
            success: false,
            is_bubble: false,
            params: None,
            rmse: None,
            fit_confidence: 0.0,
        }
    }
}

/// Aggregated result of one multi-window sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceReport {
    /// Number of windows in the sweep schedule.
    pub total_windows: usize,
    /// Windows whose fit succeeded.
    pub successful_fits: usize,
    /// Successful windows classified as bubbles.
    pub bubble_windows: usize,
    /// `100 · successful_fits / total_windows`.
    pub success_rate: f64,
    /// `100 · bubble_windows / successful_fits`, 0 when nothing fit.
    pub confidence_indicator: f64,
    /// State derived from the confidence-indicator bands.
    pub state: BubbleState,
    /// Whether the sweep hit its wall-clock deadline.
    pub timed_out: bool,
    /// Per-window outcomes in ascending window size.
    pub windows: Vec<WindowOutcome>,
}

impl ConfidenceReport {
    /// The fit exposed for charting and forecasting: the bubble window of
    /// median size when any window classified as a bubble, otherwise the
    /// successful fit with the lowest residual. With an even number of
    /// bubble windows the lower median is taken.
    #[must_use]
    pub fn representative(&self) -> Option<&WindowOutcome> {
        let bubbles: Vec<&WindowOutcome> =
            self.windows.iter().filter(|w| w.is_bubble).collect();
        if !bubbles.is_empty() {
            return Some(bubbles[(bubbles.len() - 1) / 2]);
        }

        self.windows
            .iter()
            .filter(|w| w.success)
            .min_by(|a, b| {
                let (ra, rb) = (a.rmse.unwrap_or(f64::INFINITY), b.rmse.unwrap_or(f64::INFINITY));
                ra.partial_cmp(&rb).unwrap_or(std::cmp::Ordering::Equal)
            })
    }
}

/// Window sizes swept for a series of `n` observations.
///
/// The default schedule runs `window_min..=window_max` with the
/// configured stride, capped at `n`. Shorter series fall back to
/// `max(30, n/6)..=n` so a usable sweep remains; below
/// [`MIN_OBSERVATIONS`] the schedule is empty.
#[must_use]
pub fn window_schedule(n: usize, config: &AnalysisConfig) -> Vec<usize> {
    if n < MIN_OBSERVATIONS {
        return Vec::new();
    }

    let (min, max) = if n < config.window_min {
        ((n / 6).max(MIN_OBSERVATIONS), n)
    } else {
        (config.window_min, config.window_max.min(n))
    };

    (min..=max).step_by(config.window_step).collect()
}

/// Runs the window sweep on a bounded worker pool and aggregates the
/// confidence indicator.
pub struct MultiWindowAnalyzer {
    config: AnalysisConfig,
}

impl MultiWindowAnalyzer {
    #[must_use]
    pub fn new(config: AnalysisConfig) -> Self {
        Self { config }
    }

    /// Sweeps `window` and aggregates a [`ConfidenceReport`].
    ///
    /// Windows are fitted in parallel; the per-window outcome list is
    /// emitted in ascending window size regardless of completion order.
    /// Workers check `cancel` and the wall-clock deadline between fits;
    /// windows reached afterwards are recorded as unfitted.
    ///
    /// # Errors
    /// - [`DiagnoseError::InsufficientData`] when no sweep schedule exists.
    /// - [`DiagnoseError::Timeout`] when the deadline was hit with fewer
    ///   than 10 successful fits.
    pub fn run(
        &self,
        window: &PriceWindow,
        cancel: &AtomicBool,
    ) -> Result<ConfidenceReport, DiagnoseError> {
        let n = window.len();
        let symbol = window.symbol.clone();

        let schedule = window_schedule(n, &self.config);
        if schedule.is_empty() {
            return Err(DiagnoseError::InsufficientData {
                symbol,
                observations: n,
                minimum: MIN_OBSERVATIONS,
            });
        }

        tracing::debug!(
            symbol = %symbol,
            observations = n,
            windows = schedule.len(),
            "starting multi-window sweep"
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.workers)
            .build()
            .map_err(|e| DiagnoseError::InvalidInput {
                symbol: symbol.clone(),
                stage: Stage::Aggregate,
                reason: format!("failed to build worker pool: {e}"),
            })?;

        let deadline = Instant::now() + Duration::from_secs(self.config.timeout_seconds);
        let deadline_hit = AtomicBool::new(false);
        let end_date = window.end_date();

        let outcomes: Vec<WindowOutcome> = pool.install(|| {
            schedule
                .par_iter()
                .map(|&w| {
                    let start_date = window.dates[n - w];
                    if cancel.load(Ordering::Relaxed) {
                        return WindowOutcome::unfitted(w, start_date, end_date);
                    }
                    if Instant::now() >= deadline {
                        deadline_hit.store(true, Ordering::Relaxed);
                        return WindowOutcome::unfitted(w, start_date, end_date);
                    }
                    self.fit_one(window, w, start_date, end_date)
                })
                .collect()
        });

        let timed_out = deadline_hit.load(Ordering::Relaxed);
        let total_windows = outcomes.len();
        let successful_fits = outcomes.iter().filter(|o| o.success).count();
        let bubble_windows = outcomes.iter().filter(|o| o.is_bubble).count();

        if timed_out && successful_fits < MIN_FITS_FOR_PARTIAL {
            return Err(DiagnoseError::Timeout {
                symbol,
                timeout_seconds: self.config.timeout_seconds,
                successful_fits,
            });
        }

        let confidence_indicator = if successful_fits == 0 {
            0.0
        } else {
            100.0 * bubble_windows as f64 / successful_fits as f64
        };
        let success_rate = 100.0 * successful_fits as f64 / total_windows as f64;
        let state = classify::state_from_indicator(confidence_indicator);

        tracing::info!(
            symbol = %symbol,
            total_windows,
            successful_fits,
            bubble_windows,
            confidence_indicator,
            state = %state,
            timed_out,
            "sweep complete"
        );

        Ok(ConfidenceReport {
            total_windows,
            successful_fits,
            bubble_windows,
            success_rate,
            confidence_indicator,
            state,
            timed_out,
            windows: outcomes,
        })
    }

    fn fit_one(
        &self,
        window: &PriceWindow,
        w: usize,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> WindowOutcome {
        let n = window.len();
        let y = &window.log_prices[n - w..];

        let mut fit_config = FitConfig::default().with_rmse_ceiling(self.config.rmse_ceiling);
        fit_config.seed = self.config.rng_seed.map(|seed| derive_seed(seed, w));

        let fit = fit_window(y, &fit_config);
        if !fit.success {
            tracing::trace!(window = w, "window fit failed");
            return WindowOutcome::unfitted(w, start_date, end_date);
        }

        // params is always present on success.
        let Some(params) = fit.params else {
            return WindowOutcome::unfitted(w, start_date, end_date);
        };
        let classification = classify::classify(&params, w);

        WindowOutcome {
            window_size: w,
            start_date,
            end_date,
            success: true,
            is_bubble: classification.is_bubble(),
            params: Some(params),
            rmse: Some(fit.rmse),
            fit_confidence: classification.fit_confidence,
        }
    }
}

/// Mixes the configured seed with the window size so every window gets an
/// independent, reproducible RNG stream.
fn derive_seed(seed: u64, window: usize) -> u64 {
    seed ^ (window as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocess;
    use bubble_radar_core::PriceSeries;
    use chrono::Duration as ChronoDuration;

    fn test_config() -> AnalysisConfig {
        AnalysisConfig::default()
            .with_window_range(30, 60, 5)
            .with_workers(2)
            .with_seed(42)
    }

    fn window_from_closes(closes: Vec<f64>) -> PriceWindow {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let dates = (0..closes.len() as i64)
            .map(|i| start + ChronoDuration::days(i))
            .collect();
        let series = PriceSeries::new("TEST", dates, closes).unwrap();
        preprocess::prepare(&series).unwrap()
    }

    /// Closes following a clean LPPL bubble trajectory.
    fn bubble_closes(n: usize, days_ahead: f64) -> Vec<f64> {
        let params = LpplParams {
            tc: (n - 1) as f64 + days_ahead,
            m: 0.4,
            omega: 8.0,
            a: 5.0,
            b: -0.25,
            c1: 0.03,
            c2: 0.02,
        };
        (0..n)
            .map(|t| params.log_price_at(t as f64).unwrap().exp())
            .collect()
    }

    #[test]
    fn default_schedule_caps_at_series_length() {
        let config = AnalysisConfig::default();
        let schedule = window_schedule(400, &config);

        assert_eq!(schedule.first(), Some(&125));
        assert_eq!(schedule.last(), Some(&400));
        assert!(schedule.windows(2).all(|p| p[1] - p[0] == 5));
    }

    #[test]
    fn full_schedule_has_at_most_126_windows() {
        let config = AnalysisConfig::default();
        let schedule = window_schedule(800, &config);

        assert_eq!(schedule.first(), Some(&125));
        assert_eq!(schedule.last(), Some(&750));
        assert!(schedule.len() <= 126);
    }

    #[test]
    fn short_series_reduces_schedule() {
        let config = AnalysisConfig::default();
        let schedule = window_schedule(40, &config);

        // max(30, 40/6) = 30, capped at n = 40.
        assert_eq!(schedule, vec![30, 35, 40]);
    }

    #[test]
    fn sub_minimum_series_has_no_schedule() {
        let config = AnalysisConfig::default();
        assert!(window_schedule(29, &config).is_empty());
    }

    #[test]
    fn bubble_series_yields_high_indicator() {
        let window = window_from_closes(bubble_closes(80, 30.0));
        let analyzer = MultiWindowAnalyzer::new(test_config());

        let report = analyzer.run(&window, &AtomicBool::new(false)).unwrap();

        assert_eq!(report.total_windows, 7); // 30, 35, ..., 60
        assert!(report.successful_fits > 0);
        assert!(
            report.confidence_indicator >= 60.0,
            "indicator {}",
            report.confidence_indicator
        );
        assert_eq!(report.state, BubbleState::Critical);
        assert!(!report.timed_out);
    }

    #[test]
    fn flat_series_yields_zero_indicator_and_normal_state() {
        let window = window_from_closes(vec![100.0; 80]);
        let analyzer = MultiWindowAnalyzer::new(test_config());

        let report = analyzer.run(&window, &AtomicBool::new(false)).unwrap();

        assert_eq!(report.successful_fits, 0);
        assert_eq!(report.bubble_windows, 0);
        assert!((report.confidence_indicator - 0.0).abs() < f64::EPSILON);
        assert_eq!(report.state, BubbleState::Normal);
    }

    #[test]
    fn outcomes_are_ascending_and_counts_consistent() {
        let window = window_from_closes(bubble_closes(80, 30.0));
        let analyzer = MultiWindowAnalyzer::new(test_config());

        let report = analyzer.run(&window, &AtomicBool::new(false)).unwrap();

        assert!(report
            .windows
            .windows(2)
            .all(|p| p[0].window_size < p[1].window_size));
        assert!(report.bubble_windows <= report.successful_fits);
        assert!(report.successful_fits <= report.total_windows);
        for outcome in &report.windows {
            if outcome.is_bubble {
                assert!(outcome.success, "bubble implies success");
            }
            if outcome.success {
                assert!(outcome.params.is_some());
                assert!(outcome.rmse.is_some());
            }
        }
    }

    #[test]
    fn cancellation_skips_all_windows() {
        let window = window_from_closes(bubble_closes(80, 30.0));
        let analyzer = MultiWindowAnalyzer::new(test_config());

        let report = analyzer.run(&window, &AtomicBool::new(true)).unwrap();

        assert_eq!(report.successful_fits, 0);
        assert!(!report.timed_out);
        assert_eq!(report.windows.len(), report.total_windows);
    }

    #[test]
    fn expired_deadline_with_no_fits_is_a_timeout_error() {
        let window = window_from_closes(bubble_closes(80, 30.0));
        let analyzer = MultiWindowAnalyzer::new(test_config().with_timeout_seconds(0));

        let result = analyzer.run(&window, &AtomicBool::new(false));

        assert!(matches!(result, Err(DiagnoseError::Timeout { successful_fits: 0, .. })));
    }

    #[test]
    fn seeded_runs_are_identical() {
        let window = window_from_closes(bubble_closes(80, 30.0));
        let analyzer = MultiWindowAnalyzer::new(test_config());

        let first = analyzer.run(&window, &AtomicBool::new(false)).unwrap();
        let second = analyzer.run(&window, &AtomicBool::new(false)).unwrap();

        assert_eq!(first.confidence_indicator, second.confidence_indicator);
        assert_eq!(first.successful_fits, second.successful_fits);
        for (a, b) in first.windows.iter().zip(&second.windows) {
            assert_eq!(a.success, b.success);
            assert_eq!(a.params, b.params);
        }
    }

    #[test]
    fn representative_prefers_median_bubble_window() {
        let window = window_from_closes(bubble_closes(80, 30.0));
        let analyzer = MultiWindowAnalyzer::new(test_config());

        let report = analyzer.run(&window, &AtomicBool::new(false)).unwrap();
        let representative = report.representative().unwrap();

        assert!(representative.is_bubble);
        let bubble_sizes: Vec<usize> = report
            .windows
            .iter()
            .filter(|w| w.is_bubble)
            .map(|w| w.window_size)
            .collect();
        assert_eq!(
            representative.window_size,
            bubble_sizes[(bubble_sizes.len() - 1) / 2]
        );
    }

    #[test]
    fn derive_seed_is_window_dependent() {
        assert_ne!(derive_seed(42, 125), derive_seed(42, 130));
        assert_eq!(derive_seed(42, 125), derive_seed(42, 125));
    }
}
