//! Bubble classification from fitted LPPL parameters.
//!
//! A window counts as a bubble when all four parameter-range conditions
//! hold: the critical time falls 5 to 504 trading days past the window
//! end, the power-law amplitude is negative, and the exponent and
//! log-periodic frequency sit in their empirical JLS bands.

use serde::{Deserialize, Serialize};

use crate::model::LpplParams;

/// Diagnosis severity, ordered from benign to critical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BubbleState {
    Critical,
    Warning,
    Watch,
    Normal,
}

impl BubbleState {
    /// Human-readable summary attached to diagnosis responses.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::Critical => "Strong bubble signature; critical time imminent",
            Self::Warning => "Bubble signature present; critical time further out",
            Self::Watch => "Partial bubble signature; monitoring recommended",
            Self::Normal => "No bubble signature",
        }
    }
}

impl std::fmt::Display for BubbleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Critical => "CRITICAL",
            Self::Warning => "WARNING",
            Self::Watch => "WATCH",
            Self::Normal => "NORMAL",
        };
        write!(f, "{name}")
    }
}

/// The four bubble conditions evaluated on one fitted window.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WindowClassification {
    /// Critical time 5 to 504 trading days past the window end (inclusive).
    pub tc_in_range: bool,
    /// `B < 0`: super-exponential growth branch.
    pub b_negative: bool,
    /// `0.1 ≤ m ≤ 0.9`.
    pub m_in_range: bool,
    /// `2 ≤ ω ≤ 25`.
    pub omega_in_range: bool,
    /// Trading days between the window end and the critical time.
    pub days_to_critical: f64,
    /// Fraction of the four conditions satisfied, scaled to 100.
    pub fit_confidence: f64,
}

impl WindowClassification {
    /// Conjunction of all four conditions.
    #[must_use]
    pub const fn is_bubble(&self) -> bool {
        self.tc_in_range && self.b_negative && self.m_in_range && self.omega_in_range
    }
}

/// Evaluates the bubble conditions for parameters fitted on a window of
/// `window` observations.
#[must_use]
pub fn classify(params: &LpplParams, window: usize) -> WindowClassification {
    let days_to_critical = params.tc - (window - 1) as f64;

    let tc_in_range = (5.0..=504.0).contains(&days_to_critical);
    let b_negative = params.b < 0.0;
    let m_in_range = (0.1..=0.9).contains(&params.m);
    let omega_in_range = (2.0..=25.0).contains(&params.omega);

    let satisfied = usize::from(tc_in_range)
        + usize::from(b_negative)
        + usize::from(m_in_range)
        + usize::from(omega_in_range);

    WindowClassification {
        tc_in_range,
        b_negative,
        m_in_range,
        omega_in_range,
        days_to_critical,
        fit_confidence: satisfied as f64 / 4.0 * 100.0,
    }
}

/// Single-window state rule, used when only one fit is available.
///
/// The multi-window confidence bands of [`state_from_indicator`] override
/// this in the primary (sweep) mode.
#[must_use]
pub fn single_window_state(classification: &WindowClassification) -> BubbleState {
    let bubble = classification.is_bubble();
    let confidence = classification.fit_confidence;
    let days = classification.days_to_critical;

    if bubble && days <= 60.0 && confidence >= 75.0 {
        BubbleState::Critical
    } else if bubble && days > 60.0 && confidence >= 75.0 {
        BubbleState::Warning
    } else if confidence >= 50.0 {
        BubbleState::Watch
    } else {
        BubbleState::Normal
    }
}

/// Maps a multi-window confidence indicator (percent) onto a state.
#[must_use]
pub fn state_from_indicator(confidence_indicator: f64) -> BubbleState {
    if confidence_indicator >= 60.0 {
        BubbleState::Critical
    } else if confidence_indicator >= 40.0 {
        BubbleState::Warning
    } else if confidence_indicator >= 20.0 {
        BubbleState::Watch
    } else {
        BubbleState::Normal
    }
}
