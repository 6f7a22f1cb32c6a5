//! Error types surfaced by the diagnosis pipeline.
//!
//! Only structural problems are surfaced: bad input, upstream I/O, or a
//! timeout that left too little data to aggregate. Per-window optimizer
//! failures are a normal outcome of the sweep and never appear here; they
//! are recorded as unsuccessful windows in the confidence report.

use thiserror::Error;

/// Pipeline stage at which an error was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Series validation and log-price preparation.
    Preprocess,
    /// Single-window parameter fitting.
    Fit,
    /// Multi-window sweep and statistics.
    Aggregate,
    /// Result cache read/write.
    Cache,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Preprocess => "preprocess",
            Self::Fit => "fit",
            Self::Aggregate => "aggregate",
            Self::Cache => "cache",
        };
        write!(f, "{name}")
    }
}

/// Errors returned by the diagnosis facade.
#[derive(Debug, Error)]
pub enum DiagnoseError {
    /// Fewer observations than the model minimum.
    #[error("{symbol}: insufficient data ({observations} observations, need at least {minimum})")]
    InsufficientData {
        symbol: String,
        observations: usize,
        minimum: usize,
    },

    /// Non-positive price, non-monotonic dates, or other malformed input.
    #[error("{symbol}: invalid input at {stage} stage: {reason}")]
    InvalidInput {
        symbol: String,
        stage: Stage,
        reason: String,
    },

    /// The sweep hit its wall-clock deadline before enough windows fit.
    #[error("{symbol}: analysis timed out after {timeout_seconds}s with only {successful_fits} successful fits")]
    Timeout {
        symbol: String,
        timeout_seconds: u64,
        successful_fits: usize,
    },

    /// Upstream price feed failure, passed through unchanged.
    #[error("{symbol}: price source failure: {source}")]
    PriceSource {
        symbol: String,
        #[source]
        source: anyhow::Error,
    },

    /// Cache write failure. The facade recovers from this (the computed
    /// result is still returned); the variant exists for callers that
    /// persist out-of-band and want the typed cause.
    #[error("{symbol}: cache persistence failed: {source}")]
    CachePersist {
        symbol: String,
        #[source]
        source: anyhow::Error,
    },
}

impl DiagnoseError {
    /// Symbol the failed operation was running for.
    #[must_use]
    pub fn symbol(&self) -> &str {
        match self {
            Self::InsufficientData { symbol, .. }
            | Self::InvalidInput { symbol, .. }
            | Self::Timeout { symbol, .. }
            | Self::PriceSource { symbol, .. }
            | Self::CachePersist { symbol, .. } => symbol,
        }
    }

    /// Pipeline stage the error belongs to.
    #[must_use]
    pub fn stage(&self) -> Stage {
        match self {
            Self::InsufficientData { .. } | Self::PriceSource { .. } => Stage::Preprocess,
            Self::InvalidInput { stage, .. } => *stage,
            Self::Timeout { .. } => Stage::Aggregate,
            Self::CachePersist { .. } => Stage::Cache,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_message_carries_symbol_and_cause() {
        let err = DiagnoseError::InsufficientData {
            symbol: "005930".to_string(),
            observations: 29,
            minimum: 30,
        };
        let msg = err.to_string();
        assert!(msg.contains("005930"));
        assert!(msg.contains("29"));
    }

    #[test]
    fn stages_map_to_pipeline_phases() {
        let err = DiagnoseError::Timeout {
            symbol: "AAPL".to_string(),
            timeout_seconds: 60,
            successful_fits: 3,
        };
        assert_eq!(err.stage(), Stage::Aggregate);

        let err = DiagnoseError::InvalidInput {
            symbol: "AAPL".to_string(),
            stage: Stage::Fit,
            reason: "non-finite log price".to_string(),
        };
        assert_eq!(err.stage(), Stage::Fit);

        let err = DiagnoseError::CachePersist {
            symbol: "AAPL".to_string(),
            source: anyhow::anyhow!("disk full"),
        };
        assert_eq!(err.stage(), Stage::Cache);
    }

    #[test]
    fn stage_display_is_lowercase() {
        assert_eq!(Stage::Preprocess.to_string(), "preprocess");
        assert_eq!(Stage::Aggregate.to_string(), "aggregate");
    }
}
