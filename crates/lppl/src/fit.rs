//! Single-window LPPL fitter.
//!
//! Minimizes the sum of squared log-price residuals over the seven LPPL
//! parameters by splitting them: a bounded differential-evolution search
//! over the nonlinear triple `(tc, m, ω)`, with the linear quadruple
//! `(A, B, C1, C2)` solved in closed form (normal equations) for every
//! candidate. This reduces the global search to three dimensions.
//!
//! A failed fit is a normal outcome of a window sweep, not an error: it is
//! reported through [`FitResult::success`] and consumed by the confidence
//! indicator as a negative observation.

use nalgebra::{Matrix3, Matrix4, Vector3, Vector4};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::model::LpplParams;

/// Closest admissible critical time, in days past the window end.
pub const TC_MIN_AHEAD: f64 = 5.0;
/// Farthest admissible critical time, in days past the window end
/// (two trading years).
pub const TC_MAX_AHEAD: f64 = 504.0;

const M_MIN: f64 = 0.1;
const M_MAX: f64 = 0.9;
const OMEGA_MIN: f64 = 2.0;
const OMEGA_MAX: f64 = 25.0;
const B_MIN: f64 = -2.0;
const B_MAX: f64 = 0.0;
const C_ABS_MAX: f64 = 1.0;

/// Relative SSR band within which two candidates count as tied and the
/// one with the nearer critical time wins.
const TIE_BAND: f64 = 1e-9;

/// Minimum log-price spread below which a window carries no usable shape.
const MIN_SPREAD: f64 = 1e-10;

/// Differential-evolution settings for one window fit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitConfig {
    /// Population size of the 3-D search.
    pub population: usize,
    /// Generation cap.
    pub max_generations: usize,
    /// Relative cost-spread tolerance for early convergence.
    pub tolerance: f64,
    /// Differential weight F.
    pub mutation: f64,
    /// Crossover probability CR.
    pub crossover: f64,
    /// Fits with an RMS residual above this value are rejected.
    pub rmse_ceiling: f64,
    /// Optional seed for reproducible fits.
    pub seed: Option<u64>,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            population: 30,
            max_generations: 200,
            tolerance: 1e-6,
            mutation: 0.8,
            crossover: 0.9,
            rmse_ceiling: 0.5,
            seed: None,
        }
    }
}

impl FitConfig {
    /// Sets a seed for a reproducible fit.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Sets the RMS-residual ceiling.
    #[must_use]
    pub fn with_rmse_ceiling(mut self, ceiling: f64) -> Self {
        self.rmse_ceiling = ceiling;
        self
    }

    /// Sets the optimizer budget.
    #[must_use]
    pub fn with_budget(mut self, population: usize, max_generations: usize) -> Self {
        self.population = population;
        self.max_generations = max_generations;
        self
    }
}

/// Outcome of one window fit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitResult {
    /// Number of observations fitted.
    pub window: usize,
    /// Whether the fit satisfied all bounds and the residual ceiling.
    pub success: bool,
    /// Fitted parameters; present only on success.
    pub params: Option<LpplParams>,
    /// Sum of squared residuals of the winning candidate.
    pub ssr: f64,
    /// Root-mean-square residual of the winning candidate.
    pub rmse: f64,
}

impl FitResult {
    fn failure(window: usize) -> Self {
        Self {
            window,
            success: false,
            params: None,
            ssr: f64::INFINITY,
            rmse: f64::INFINITY,
        }
    }
}

/// One evaluated point of the 3-D search.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    x: [f64; 3],
    cost: f64,
    ssr: f64,
    linear: [f64; 4],
    feasible: bool,
}

impl Candidate {
    const fn tc(&self) -> f64 {
        self.x[0]
    }
}

/// Fits the LPPL model to one window of log prices.
///
/// Day offsets are the slice indices (`t[i] = i`). The returned result is
/// deterministic for a given `(log_prices, config.seed)` pair.
#[must_use]
pub fn fit_window(log_prices: &[f64], config: &FitConfig) -> FitResult {
    let n = log_prices.len();
    if n < 8 || config.population < 4 {
        return FitResult::failure(n);
    }

    let (mut y_min, mut y_max) = (f64::INFINITY, f64::NEG_INFINITY);
    for &y in log_prices {
        if !y.is_finite() {
            return FitResult::failure(n);
        }
        y_min = y_min.min(y);
        y_max = y_max.max(y);
    }
    if y_max - y_min < MIN_SPREAD {
        // A flat window has no power-law shape to recover.
        return FitResult::failure(n);
    }

    let t_last = (n - 1) as f64;
    let bounds = [
        [t_last + TC_MIN_AHEAD, t_last + TC_MAX_AHEAD],
        [M_MIN, M_MAX],
        [OMEGA_MIN, OMEGA_MAX],
    ];

    let mut rng = match config.seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    };

    let mut objective = Objective::new(log_prices, y_min - 1.0, y_max + 1.0);

    // Initial population, uniform over the bounded box.
    let mut population: Vec<Candidate> = (0..config.population)
        .map(|_| {
            let x = [
                rng.gen_range(bounds[0][0]..=bounds[0][1]),
                rng.gen_range(bounds[1][0]..=bounds[1][1]),
                rng.gen_range(bounds[2][0]..=bounds[2][1]),
            ];
            objective.eval(x)
        })
        .collect();

    let mut best = population[0];
    for candidate in &population[1..] {
        if prefer(candidate, &best, t_last) {
            best = *candidate;
        }
    }

    for _ in 0..config.max_generations {
        for i in 0..config.population {
            let [r1, r2, r3] = distinct_indices(&mut rng, config.population, i);

            let mut trial = [0.0; 3];
            let j_rand = rng.gen_range(0..3);
            for d in 0..3 {
                let value = if d == j_rand || rng.gen::<f64>() < config.crossover {
                    let mutant = population[r1].x[d]
                        + config.mutation * (population[r2].x[d] - population[r3].x[d]);
                    mutant.clamp(bounds[d][0], bounds[d][1])
                } else {
                    population[i].x[d]
                };
                trial[d] = value;
            }

            let challenger = objective.eval(trial);
            if challenger.cost <= population[i].cost {
                population[i] = challenger;
            }
            if prefer(&challenger, &best, t_last) {
                best = challenger;
            }
        }

        let (mut lo, mut hi) = (f64::INFINITY, f64::NEG_INFINITY);
        for candidate in &population {
            lo = lo.min(candidate.cost);
            hi = hi.max(candidate.cost);
        }
        if hi.is_finite() && hi - lo <= config.tolerance * lo.abs().max(config.tolerance) {
            break;
        }
    }

    if !best.feasible || !best.cost.is_finite() {
        return FitResult::failure(n);
    }

    let rmse = (best.ssr / n as f64).sqrt();
    if !rmse.is_finite() || rmse > config.rmse_ceiling {
        return FitResult::failure(n);
    }

    let params = LpplParams {
        tc: best.x[0],
        m: best.x[1],
        omega: best.x[2],
        a: best.linear[0],
        b: best.linear[1],
        c1: best.linear[2],
        c2: best.linear[3],
    };

    FitResult {
        window: n,
        success: true,
        params: Some(params),
        ssr: best.ssr,
        rmse,
    }
}

/// Returns true when `challenger` should replace `incumbent` as the global
/// best: lower cost, or cost within the tie band and a critical time
/// closer to the window end.
fn prefer(challenger: &Candidate, incumbent: &Candidate, t_last: f64) -> bool {
    if !challenger.cost.is_finite() {
        return false;
    }
    if !incumbent.cost.is_finite() {
        return true;
    }
    let band = TIE_BAND * incumbent.cost.min(challenger.cost).abs();
    if (challenger.cost - incumbent.cost).abs() <= band {
        let n = t_last + 1.0;
        return (challenger.tc() - n).abs() < (incumbent.tc() - n).abs();
    }
    challenger.cost < incumbent.cost
}

/// Draws three distinct population indices, all different from `skip`.
fn distinct_indices(rng: &mut ChaCha8Rng, population: usize, skip: usize) -> [usize; 3] {
    let mut picked = [0usize; 3];
    let mut count = 0;
    while count < 3 {
        let idx = rng.gen_range(0..population);
        if idx == skip || picked[..count].contains(&idx) {
            continue;
        }
        picked[count] = idx;
        count += 1;
    }
    picked
}

/// Evaluates the 3-D objective: closed-form OLS for `(A, B, C1, C2)` and
/// the resulting SSR, with out-of-bound linear solutions penalized in
/// proportion to the violation so the population is steered into the
/// feasible box.
struct Objective<'a> {
    y: &'a [f64],
    a_min: f64,
    a_max: f64,
    /// Design rows `[1, f, h, k]`, reused across evaluations.
    rows: Vec<[f64; 4]>,
}

impl<'a> Objective<'a> {
    fn new(y: &'a [f64], a_min: f64, a_max: f64) -> Self {
        Self {
            y,
            a_min,
            a_max,
            rows: Vec::with_capacity(y.len()),
        }
    }

    fn eval(&mut self, x: [f64; 3]) -> Candidate {
        let [tc, m, omega] = x;
        self.rows.clear();

        let mut xtx = Matrix4::<f64>::zeros();
        let mut xty = Vector4::<f64>::zeros();

        for (i, &yi) in self.y.iter().enumerate() {
            let dt = tc - i as f64;
            if dt <= 0.0 {
                return Candidate::rejected(x);
            }
            let dt_m = dt.powf(m);
            if !dt_m.is_finite() {
                return Candidate::rejected(x);
            }
            let (sin, cos) = (omega * dt.ln()).sin_cos();
            let row = [1.0, dt_m, dt_m * cos, dt_m * sin];
            self.rows.push(row);

            for r in 0..4 {
                xty[r] += row[r] * yi;
                for c in r..4 {
                    xtx[(r, c)] += row[r] * row[c];
                }
            }
        }
        for r in 1..4 {
            for c in 0..r {
                xtx[(r, c)] = xtx[(c, r)];
            }
        }

        let Some(beta) = xtx.lu().solve(&xty) else {
            return Candidate::rejected(x);
        };
        let mut linear = [beta[0], beta[1], beta[2], beta[3]];

        // The subproblem is convex, so when the unconstrained amplitude
        // falls outside [B_MIN, B_MAX] the bounded optimum pins B at the
        // nearer bound; the remaining coefficients are re-solved with B
        // fixed. A fit pinned at B = 0 is a valid non-bubble fit.
        if !(B_MIN..=B_MAX).contains(&linear[1]) && linear[1].is_finite() {
            let b_fixed = linear[1].clamp(B_MIN, B_MAX);
            let Some([a, c1, c2]) = self.solve_with_fixed_b(b_fixed) else {
                return Candidate::rejected(x);
            };
            linear = [a, b_fixed, c1, c2];
        }

        if linear.iter().any(|v| !v.is_finite()) {
            return Candidate::rejected(x);
        }

        let mut ssr = 0.0;
        for (row, &yi) in self.rows.iter().zip(self.y) {
            let predicted =
                linear[0] + linear[1] * row[1] + linear[2] * row[2] + linear[3] * row[3];
            let residual = yi - predicted;
            ssr += residual * residual;
        }

        let violation = excess(linear[0], self.a_min, self.a_max)
            + excess(linear[2], -C_ABS_MAX, C_ABS_MAX)
            + excess(linear[3], -C_ABS_MAX, C_ABS_MAX);

        let feasible = violation == 0.0;
        let cost = if feasible {
            ssr
        } else {
            ssr + (1.0 + ssr) * violation * violation * 1e3
        };

        Candidate { x, cost, ssr, linear, feasible }
    }

    /// Re-solves `(A, C1, C2)` with the power-law amplitude held at `b`.
    fn solve_with_fixed_b(&self, b: f64) -> Option<[f64; 3]> {
        let mut xtx = Matrix3::<f64>::zeros();
        let mut xty = Vector3::<f64>::zeros();

        for (row, &yi) in self.rows.iter().zip(self.y) {
            let target = yi - b * row[1];
            let reduced = [1.0, row[2], row[3]];
            for r in 0..3 {
                xty[r] += reduced[r] * target;
                for c in r..3 {
                    xtx[(r, c)] += reduced[r] * reduced[c];
                }
            }
        }
        for r in 1..3 {
            for c in 0..r {
                xtx[(r, c)] = xtx[(c, r)];
            }
        }

        let beta = xtx.lu().solve(&xty)?;
        Some([beta[0], beta[1], beta[2]])
    }
}

impl Candidate {
    const fn rejected(x: [f64; 3]) -> Self {
        Self {
            x,
            cost: f64::INFINITY,
            ssr: f64::INFINITY,
            linear: [0.0; 4],
            feasible: false,
        }
    }
}

/// How far `value` lies outside `[lo, hi]`.
fn excess(value: f64, lo: f64, hi: f64) -> f64 {
    if value < lo {
        lo - value
    } else if value > hi {
        value - hi
    } else {
        0.0
    }
}
