use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://bubble_radar.db".to_string(),
            max_connections: 5,
        }
    }
}

/// Tuning knobs for the multi-window LPPL analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Smallest sweep window, in observations.
    pub window_min: usize,
    /// Largest sweep window, in observations.
    pub window_max: usize,
    /// Stride between consecutive window sizes.
    pub window_step: usize,
    /// Business days projected past the representative window end.
    pub forecast_days: usize,
    /// Wall-clock ceiling for one sweep, in seconds.
    pub timeout_seconds: u64,
    /// Fit-parallelism (worker threads for the window sweep).
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Optional seed for reproducible fits.
    pub rng_seed: Option<u64>,
    /// Fits with an RMS residual above this value are counted as failures.
    pub rmse_ceiling: f64,
}

fn default_workers() -> usize {
    let cores = std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
    cores.min(8)
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            window_min: 125,
            window_max: 750,
            window_step: 5,
            forecast_days: 60,
            timeout_seconds: 60,
            workers: default_workers(),
            rng_seed: None,
            rmse_ceiling: 0.5,
        }
    }
}

impl AnalysisConfig {
    /// Sets the sweep window range.
    #[must_use]
    pub fn with_window_range(mut self, min: usize, max: usize, step: usize) -> Self {
        self.window_min = min;
        self.window_max = max;
        self.window_step = step;
        self
    }

    /// Sets the forecast horizon in business days.
    #[must_use]
    pub fn with_forecast_days(mut self, days: usize) -> Self {
        self.forecast_days = days;
        self
    }

    /// Sets the sweep deadline.
    #[must_use]
    pub fn with_timeout_seconds(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    /// Sets the worker-thread count for the sweep.
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Sets a seed for reproducible runs.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    /// Sets the RMS-residual ceiling above which fits are rejected.
    #[must_use]
    pub fn with_rmse_ceiling(mut self, ceiling: f64) -> Self {
        self.rmse_ceiling = ceiling;
        self
    }

    /// Checks internal consistency of the configuration.
    ///
    /// # Errors
    /// Returns an error for a zero step, an inverted window range, a window
    /// minimum below the model's 30-observation floor, zero workers, or a
    /// non-positive RMSE ceiling.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.window_step == 0 {
            anyhow::bail!("window_step must be positive");
        }
        if self.window_min > self.window_max {
            anyhow::bail!(
                "window_min {} exceeds window_max {}",
                self.window_min,
                self.window_max
            );
        }
        if self.window_min < 30 {
            anyhow::bail!("window_min {} is below the 30-observation minimum", self.window_min);
        }
        if self.workers == 0 {
            anyhow::bail!("workers must be positive");
        }
        if self.rmse_ceiling <= 0.0 || !self.rmse_ceiling.is_finite() {
            anyhow::bail!("rmse_ceiling must be a positive finite value");
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            analysis: AnalysisConfig::default(),
        }
    }
}
