//! Validated daily close series.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::errors::{DiagnoseError, Stage};

/// A time-indexed daily close series for one symbol.
///
/// Invariants (enforced by [`PriceSeries::new`]):
/// - `dates.len() == closes.len()`
/// - dates are strictly increasing
/// - every close is finite and strictly positive
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceSeries {
    /// Ticker the series belongs to.
    pub symbol: String,
    /// Business days, ascending.
    pub dates: Vec<NaiveDate>,
    /// Daily closing prices.
    pub closes: Vec<f64>,
}

impl PriceSeries {
    /// Creates a validated series.
    ///
    /// # Errors
    /// Returns [`DiagnoseError::InvalidInput`] if lengths differ, dates are
    /// not strictly increasing, or any close is non-positive or non-finite.
    /// NaN closes are accepted here; the preprocessor strips leading and
    /// trailing NaNs before analysis.
    pub fn new(
        symbol: impl Into<String>,
        dates: Vec<NaiveDate>,
        closes: Vec<f64>,
    ) -> Result<Self, DiagnoseError> {
        let symbol = symbol.into();

        if dates.len() != closes.len() {
            return Err(invalid(
                &symbol,
                format!("{} dates but {} closes", dates.len(), closes.len()),
            ));
        }
        for pair in dates.windows(2) {
            if pair[1] <= pair[0] {
                return Err(invalid(
                    &symbol,
                    format!("dates not strictly increasing at {}", pair[1]),
                ));
            }
        }
        for (date, &close) in dates.iter().zip(&closes) {
            if close.is_nan() {
                continue;
            }
            if !close.is_finite() || close <= 0.0 {
                return Err(invalid(&symbol, format!("non-positive close {close} on {date}")));
            }
        }

        Ok(Self { symbol, dates, closes })
    }

    /// Number of observations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.closes.len()
    }

    /// Returns true when the series holds no observations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.closes.is_empty()
    }

    /// Date of the most recent observation.
    #[must_use]
    pub fn last_date(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }
}

fn invalid(symbol: &str, reason: String) -> DiagnoseError {
    DiagnoseError::InvalidInput {
        symbol: symbol.to_string(),
        stage: Stage::Preprocess,
        reason,
    }
}
