//! LPPL model evaluation.
//!
//! The model for a log price at day offset `t` is
//!
//! ```text
//! ln p(t) = A + B (tc - t)^m + C (tc - t)^m cos(ω ln(tc - t) + φ)
//! ```
//!
//! Internally the oscillation is carried in the linearized form
//! `C1 h(t) + C2 k(t)` with `h = Δ^m cos(ω ln Δ)`, `k = Δ^m sin(ω ln Δ)`,
//! `C1 = C cos φ` and `C2 = -C sin φ`, which is linear in `(A, B, C1, C2)`
//! for a fixed nonlinear triple `(tc, m, ω)`. The model is undefined for
//! `t ≥ tc`.

use serde::{Deserialize, Serialize};

/// Fitted LPPL parameter set.
///
/// `tc` is expressed on the same day-offset scale as the window it was
/// fitted on (`t = 0, 1, …, N-1`), so `tc > N - 1` places the critical
/// time in the future.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LpplParams {
    /// Critical time, in day offsets from the window start.
    pub tc: f64,
    /// Power-law exponent.
    pub m: f64,
    /// Log-periodic angular frequency.
    pub omega: f64,
    /// Log-price level at the critical time.
    pub a: f64,
    /// Power-law amplitude; negative for the bubble branch.
    pub b: f64,
    /// Cosine component of the oscillation amplitude.
    pub c1: f64,
    /// Sine component of the oscillation amplitude.
    pub c2: f64,
}

impl LpplParams {
    /// Oscillation amplitude `C = sqrt(C1² + C2²)`.
    #[must_use]
    pub fn c_amplitude(&self) -> f64 {
        (self.c1 * self.c1 + self.c2 * self.c2).sqrt()
    }

    /// Oscillation phase `φ = atan2(-C2, C1)`.
    #[must_use]
    pub fn phase(&self) -> f64 {
        (-self.c2).atan2(self.c1)
    }

    /// Predicted log price at day offset `t`.
    ///
    /// Returns `None` when `t ≥ tc`, where the power law diverges.
    #[must_use]
    pub fn log_price_at(&self, t: f64) -> Option<f64> {
        let dt = self.tc - t;
        if dt <= 0.0 {
            return None;
        }
        let dt_m = dt.powf(self.m);
        if !dt_m.is_finite() {
            return None;
        }
        let log_dt = dt.ln();
        let (sin, cos) = (self.omega * log_dt).sin_cos();
        Some(self.a + self.b * dt_m + dt_m * (self.c1 * cos + self.c2 * sin))
    }

    /// Predicted price at day offset `t` (`exp` of the log prediction).
    #[must_use]
    pub fn price_at(&self, t: f64) -> Option<f64> {
        self.log_price_at(t).map(f64::exp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sample_params() -> LpplParams {
        LpplParams {
            tc: 150.0,
            m: 0.4,
            omega: 7.5,
            a: 5.0,
            b: -0.3,
            c1: 0.04,
            c2: -0.02,
        }
    }

    #[test]
    fn linearized_form_matches_phase_form() {
        let p = sample_params();
        let c = p.c_amplitude();
        let phi = p.phase();

        for t in [0.0, 37.0, 99.5, 149.0] {
            let dt: f64 = p.tc - t;
            let expected = p.a
                + p.b * dt.powf(p.m)
                + c * dt.powf(p.m) * (p.omega * dt.ln() + phi).cos();
            let got = p.log_price_at(t).unwrap();
            assert_relative_eq!(got, expected, epsilon = 1e-12);
        }
    }

    #[test]
    fn undefined_at_and_past_critical_time() {
        let p = sample_params();
        assert!(p.log_price_at(150.0).is_none());
        assert!(p.log_price_at(150.5).is_none());
        assert!(p.log_price_at(1000.0).is_none());
        assert!(p.log_price_at(149.999).is_some());
    }

    #[test]
    fn price_is_exp_of_log_price() {
        let p = sample_params();
        let log_price = p.log_price_at(10.0).unwrap();
        let price = p.price_at(10.0).unwrap();
        assert_relative_eq!(price, log_price.exp(), epsilon = 1e-12);
    }

    #[test]
    fn amplitude_and_phase_recover_components() {
        let c: f64 = 0.05;
        let phi: f64 = 0.8;
        let p = LpplParams {
            c1: c * phi.cos(),
            c2: -c * phi.sin(),
            ..sample_params()
        };
        assert_relative_eq!(p.c_amplitude(), c, epsilon = 1e-12);
        assert_relative_eq!(p.phase(), phi, epsilon = 1e-12);
    }
}
