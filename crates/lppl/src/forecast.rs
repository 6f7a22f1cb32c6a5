//! Fitted-curve reconstruction and business-day forecasting.
//!
//! Both curves are evaluated on the fitted window's day-offset scale and
//! mapped back to price space with `exp`. Forecast emission stops strictly
//! before `⌊tc⌋`: the power law diverges at the critical time and the
//! model is not defined beyond it.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::model::LpplParams;

/// One dated point of a fitted or forecast price curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurvePoint {
    pub date: NaiveDate,
    pub price: f64,
}

/// Reconstructs the fitted price curve over a window.
///
/// `dates` must be the window's own trading days; observation `i` is
/// evaluated at `t = i`.
#[must_use]
pub fn fitted_curve(params: &LpplParams, dates: &[NaiveDate]) -> Vec<CurvePoint> {
    dates
        .iter()
        .enumerate()
        .filter_map(|(t, &date)| {
            params.price_at(t as f64).map(|price| CurvePoint { date, price })
        })
        .collect()
}

/// Projects the fitted curve up to `horizon` business days past the
/// window end, stopping before the critical time.
///
/// `window` is the fitted window length, so the first projected offset is
/// `t = window`; `last_date` is the window's final trading day.
#[must_use]
pub fn forecast_curve(
    params: &LpplParams,
    last_date: NaiveDate,
    window: usize,
    horizon: usize,
) -> Vec<CurvePoint> {
    let cutoff = params.tc.floor();
    let mut points = Vec::with_capacity(horizon);
    let mut date = last_date;

    for t in window..window + horizon {
        if (t as f64) >= cutoff {
            break;
        }
        date = next_business_day(date);
        match params.price_at(t as f64) {
            Some(price) => points.push(CurvePoint { date, price }),
            None => break,
        }
    }

    points
}

/// First business day strictly after `date` (weekends skipped; exchange
/// holidays are not modeled).
#[must_use]
pub fn next_business_day(date: NaiveDate) -> NaiveDate {
    let mut next = date + Duration::days(1);
    while matches!(next.weekday(), Weekday::Sat | Weekday::Sun) {
        next += Duration::days(1);
    }
    next
}

/// Advances `date` by `n` business days.
#[must_use]
pub fn add_business_days(date: NaiveDate, n: usize) -> NaiveDate {
    let mut current = date;
    for _ in 0..n {
        current = next_business_day(current);
    }
    current
}
