//! Price preprocessing for LPPL fitting.
//!
//! Normalizes a validated close series into log prices on an index-based
//! day-offset scale: `t[i] = i`, so calendar gaps (weekends, holidays) are
//! ignored and `tc` is measured in observations from the window start.

use bubble_radar_core::{DiagnoseError, PriceSeries, Stage};
use chrono::NaiveDate;

/// Minimum number of observations the model is fitted on.
pub const MIN_OBSERVATIONS: usize = 30;

/// A contiguous run of daily observations prepared for fitting.
///
/// Day offsets are implicit: observation `i` sits at `t = i`.
#[derive(Debug, Clone)]
pub struct PriceWindow {
    /// Symbol the window was built for.
    pub symbol: String,
    /// Trading day of each observation, ascending.
    pub dates: Vec<NaiveDate>,
    /// Natural log of each close.
    pub log_prices: Vec<f64>,
}

impl PriceWindow {
    /// Number of observations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.log_prices.len()
    }

    /// Returns true when the window holds no observations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.log_prices.is_empty()
    }

    /// Date of the window's first observation.
    #[must_use]
    pub fn start_date(&self) -> NaiveDate {
        self.dates[0]
    }

    /// Date of the window's last observation.
    #[must_use]
    pub fn end_date(&self) -> NaiveDate {
        self.dates[self.dates.len() - 1]
    }
}

/// Builds a [`PriceWindow`] from a close series.
///
/// Leading and trailing NaN closes are stripped; an interior NaN is
/// rejected because index-based offsets assume a contiguous run.
///
/// # Errors
/// - [`DiagnoseError::InsufficientData`] when fewer than
///   [`MIN_OBSERVATIONS`] usable observations remain.
/// - [`DiagnoseError::InvalidInput`] for interior NaNs or non-positive
///   closes.
pub fn prepare(series: &PriceSeries) -> Result<PriceWindow, DiagnoseError> {
    let closes = &series.closes;

    let first_valid = closes.iter().position(|c| !c.is_nan());
    let Some(first) = first_valid else {
        return Err(DiagnoseError::InsufficientData {
            symbol: series.symbol.clone(),
            observations: 0,
            minimum: MIN_OBSERVATIONS,
        });
    };
    let last = closes.iter().rposition(|c| !c.is_nan()).unwrap_or(first);

    let mut dates = Vec::with_capacity(last + 1 - first);
    let mut log_prices = Vec::with_capacity(last + 1 - first);
    for i in first..=last {
        let close = closes[i];
        if close.is_nan() {
            return Err(DiagnoseError::InvalidInput {
                symbol: series.symbol.clone(),
                stage: Stage::Preprocess,
                reason: format!("interior NaN close on {}", series.dates[i]),
            });
        }
        if close <= 0.0 || !close.is_finite() {
            return Err(DiagnoseError::InvalidInput {
                symbol: series.symbol.clone(),
                stage: Stage::Preprocess,
                reason: format!("non-positive close {close} on {}", series.dates[i]),
            });
        }
        dates.push(series.dates[i]);
        log_prices.push(close.ln());
    }

    if log_prices.len() < MIN_OBSERVATIONS {
        return Err(DiagnoseError::InsufficientData {
            symbol: series.symbol.clone(),
            observations: log_prices.len(),
            minimum: MIN_OBSERVATIONS,
        });
    }

    Ok(PriceWindow {
        symbol: series.symbol.clone(),
        dates,
        log_prices,
    })
}
