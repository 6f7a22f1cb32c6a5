//! Diagnosis response schema and the cached-analysis record.
//!
//! Everything here serializes to the JSON shape consumed by callers:
//! dates as `YYYY-MM-DD`, states as the four uppercase literals, array
//! fields always present.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use bubble_radar_core::AnalysisConfig;

use crate::classify::BubbleState;
use crate::forecast::CurvePoint;
use crate::model::LpplParams;
use crate::sweep::ConfidenceReport;

/// Span of observations covered by a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisPeriod {
    /// First trading day of the largest sweep window.
    pub start: NaiveDate,
    /// Last trading day of the series.
    pub end: NaiveDate,
    /// Observations in the largest sweep window.
    pub days: usize,
}

/// Window geometry a sweep was requested with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowRange {
    pub min: usize,
    pub max: usize,
    pub step: usize,
}

/// Aggregate sweep counters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SweepStatistics {
    pub total_windows: usize,
    pub successful_fits: usize,
    pub bubble_windows: usize,
    /// Percentage of windows that fit successfully.
    pub success_rate: f64,
}

/// Per-window entry of the response's detail list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowDetail {
    pub window_size: usize,
    pub success: bool,
    pub is_bubble: bool,
}

/// The single fit selected for charting and forecasting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepresentativeFit {
    pub parameters: LpplParams,
    /// Window the representative fit was produced on.
    pub window_size: usize,
    /// Root-mean-square residual of the fit.
    pub rmse: f64,
    /// Trading days from the window end to the critical time, one decimal.
    pub days_to_critical: f64,
    /// Calendar date of the critical time, when it lies ahead.
    pub critical_date: Option<NaiveDate>,
    /// Fitted price curve over the representative window.
    pub fitted_points: Vec<CurvePoint>,
    /// Forecast curve past the window end, stopping before `tc`.
    pub forecast_points: Vec<CurvePoint>,
}

/// Full diagnosis payload returned by the facade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosisResponse {
    pub symbol: String,
    pub state: BubbleState,
    /// Percentage of successful fits that classified as bubbles.
    pub confidence_indicator: f64,
    /// Human-readable summary of the state.
    pub message: String,
    pub analysis_period: AnalysisPeriod,
    pub window_range: WindowRange,
    pub statistics: SweepStatistics,
    pub representative_fit: Option<RepresentativeFit>,
    pub detailed_results: Vec<WindowDetail>,
    /// Whether the sweep hit its wall-clock deadline (partial result).
    pub timed_out: bool,
    /// Whether the payload was served from the result cache.
    pub cached: bool,
    /// False only when a freshly computed result could not be persisted.
    pub cache_miss_persisted: bool,
    /// Wall-clock cost of the sweep; absent on cache hits.
    pub computation_seconds: Option<f64>,
}

/// One persisted multi-window analysis, the unit the result store reads
/// and writes.
///
/// `analysis_date` equals `last_price_date` at the moment of write; the
/// store retains only the newest record per symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedAnalysis {
    pub symbol: String,
    /// Calendar date of the last observation used by the sweep.
    pub analysis_date: NaiveDate,
    /// Most recent price date available when the analysis ran.
    pub last_price_date: NaiveDate,
    pub window_min: usize,
    pub window_max: usize,
    pub window_step: usize,
    /// Aggregate and per-window results, written as a unit.
    pub report: ConfidenceReport,
    /// Wall-clock cost of the sweep in seconds.
    pub computation_seconds: f64,
    /// Timestamp the record was created.
    pub created_at: DateTime<Utc>,
}

impl CachedAnalysis {
    /// Whether this record was produced with the same window geometry the
    /// caller is requesting. A geometry change invalidates the cache.
    #[must_use]
    pub fn matches_window_config(&self, config: &AnalysisConfig) -> bool {
        self.window_min == config.window_min
            && self.window_max == config.window_max
            && self.window_step == config.window_step
    }
}
