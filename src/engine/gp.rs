//! Gaussian process surrogate with Expected Improvement acquisition.
//!
//! Inputs live in the unit cube `[0, 1]^d`; the engine scales them to the
//! declared bounds. Targets are minimized. The surrogate uses a Matérn 5/2
//! kernel with ARD lengthscales set to the per-dimension spread of the
//! training inputs, and candidates are picked by random search over the
//! acquisition function.
//!
//! Batches are built with the constant-liar heuristic: after each pick the
//! point is added to the training set with the current best target as a
//! fake observation and the model is refitted, which pushes the next pick
//! away from the previous ones.

use nalgebra::{DMatrix, DVector};

use crate::error::{Error, Result};

/// Precomputed √5 constant.
const SQRT_5: f64 = 2.236_067_977_499_79;

/// Maximum number of training points used for a fit.
const MAX_TRAIN_POINTS: usize = 100;

/// Matérn 5/2 kernel with ARD lengthscales.
///
/// `k(x1, x2) = σ² (1 + √5 r + 5/3 r²) exp(-√5 r)`
/// where `r = sqrt(Σ ((x1_i - x2_i) / l_i)²)`
fn matern52(x1: &[f64], x2: &[f64], lengthscales: &[f64], signal_var: f64) -> f64 {
    let r_sq: f64 = x1
        .iter()
        .zip(x2)
        .zip(lengthscales)
        .map(|((a, b), l)| ((a - b) / l).powi(2))
        .sum();
    let sqrt5_r = SQRT_5 * r_sq.sqrt();
    signal_var * (1.0 + sqrt5_r + 5.0 / 3.0 * r_sq) * (-sqrt5_r).exp()
}

/// Build the kernel matrix `K + σ²I`.
fn kernel_matrix(
    x: &[Vec<f64>],
    lengthscales: &[f64],
    signal_var: f64,
    noise_var: f64,
) -> DMatrix<f64> {
    let n = x.len();
    DMatrix::from_fn(n, n, |i, j| {
        let k = matern52(&x[i], &x[j], lengthscales, signal_var);
        if i == j { k + noise_var } else { k }
    })
}

/// A fitted GP ready for predictions.
pub(crate) struct GpModel {
    /// Cholesky factor of `K + σ²I`.
    cholesky: nalgebra::linalg::Cholesky<f64, nalgebra::Dyn>,
    /// `α = (K + σ²I)⁻¹ y`.
    alpha: DVector<f64>,
    x_train: Vec<Vec<f64>>,
    lengthscales: Vec<f64>,
    signal_var: f64,
    /// Best observed standardized target.
    f_best: f64,
}

impl GpModel {
    /// Fit to `(x_train, y_train)`, using the most recent points only.
    ///
    /// Returns `None` when there is no data or the kernel matrix is not
    /// positive definite.
    #[allow(clippy::cast_precision_loss)]
    pub(crate) fn fit(x_train: &[Vec<f64>], y_train: &[f64], noise_var: f64) -> Option<Self> {
        let start = y_train.len().saturating_sub(MAX_TRAIN_POINTS);
        let x_train = &x_train[start..];
        let y_train = &y_train[start..];
        let n = y_train.len();
        if n == 0 || x_train.len() != n {
            return None;
        }

        let y_mean = y_train.iter().sum::<f64>() / n as f64;
        let y_var = if n > 1 {
            y_train.iter().map(|&y| (y - y_mean).powi(2)).sum::<f64>() / (n - 1) as f64
        } else {
            1.0
        };
        let y_std = y_var.sqrt().max(1e-10);
        let y_standardized: Vec<f64> = y_train.iter().map(|&y| (y - y_mean) / y_std).collect();
        let f_best = y_standardized.iter().copied().fold(f64::INFINITY, f64::min);

        let d = x_train[0].len();
        let lengthscales: Vec<f64> = (0..d)
            .map(|j| {
                let mean_j = x_train.iter().map(|x| x[j]).sum::<f64>() / n as f64;
                let var_j = x_train.iter().map(|x| (x[j] - mean_j).powi(2)).sum::<f64>() / n as f64;
                var_j.sqrt().max(0.01)
            })
            .collect();

        // Targets are standardized, so unit signal variance.
        let signal_var = 1.0;
        let k = kernel_matrix(x_train, &lengthscales, signal_var, noise_var);
        let cholesky = nalgebra::linalg::Cholesky::new(k)?;
        let alpha = cholesky.solve(&DVector::from_column_slice(&y_standardized));

        Some(Self {
            cholesky,
            alpha,
            x_train: x_train.to_vec(),
            lengthscales,
            signal_var,
            f_best,
        })
    }

    /// Posterior mean and standard deviation at `x`, in standardized units.
    pub(crate) fn predict(&self, x: &[f64]) -> (f64, f64) {
        let k_star = DVector::from_fn(self.x_train.len(), |i, _| {
            matern52(x, &self.x_train[i], &self.lengthscales, self.signal_var)
        });
        let mean = k_star.dot(&self.alpha);
        let v = self.cholesky.solve(&k_star);
        let var = (self.signal_var - k_star.dot(&v)).max(0.0);
        (mean, var.sqrt())
    }

    pub(crate) fn expected_improvement(&self, x: &[f64]) -> f64 {
        let (mean, std) = self.predict(x);
        expected_improvement(mean, std, self.f_best)
    }
}

/// Standard normal PDF.
fn norm_pdf(x: f64) -> f64 {
    const INV_SQRT_2PI: f64 = 0.398_942_280_401_432_7;
    INV_SQRT_2PI * (-0.5 * x * x).exp()
}

/// Standard normal CDF (Hart rational approximation).
fn norm_cdf(x: f64) -> f64 {
    if x < -8.0 {
        return 0.0;
    }
    if x > 8.0 {
        return 1.0;
    }

    let t = 1.0 / (1.0 + 0.231_641_9 * x.abs());
    let poly = t
        * (0.319_381_530
            + t * (-0.356_563_782 + t * (1.781_477_937 + t * (-1.821_255_978 + t * 1.330_274_429))));
    let cdf = 1.0 - norm_pdf(x.abs()) * poly;

    if x >= 0.0 { cdf } else { 1.0 - cdf }
}

/// `EI(x) = (f_best - mean) Φ(z) + std φ(z)` with `z = (f_best - mean) / std`.
fn expected_improvement(mean: f64, std: f64, f_best: f64) -> f64 {
    if std < 1e-12 {
        return (f_best - mean).max(0.0);
    }
    let z = (f_best - mean) / std;
    ((f_best - mean) * norm_cdf(z) + std * norm_pdf(z)).max(0.0)
}

/// Acquisition search settings.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Search {
    pub(crate) n_candidates: usize,
    pub(crate) noise_variance: f64,
}

/// Pick `n` points in the unit cube that maximize Expected Improvement,
/// restricted to points accepted by `feasible`.
///
/// Falls back to random feasible points when the GP cannot be fitted.
///
/// # Errors
///
/// Returns [`Error::InvalidSearchSpace`] when no sampled candidate is feasible.
pub(crate) fn propose_batch(
    x_train: &[Vec<f64>],
    y_train: &[f64],
    n: usize,
    search: Search,
    rng: &mut fastrand::Rng,
    feasible: impl Fn(&[f64]) -> bool,
) -> Result<Vec<Vec<f64>>> {
    let dims = x_train.first().map_or(0, Vec::len);
    let mut xs = x_train.to_vec();
    let mut ys = y_train.to_vec();
    let liar = y_train.iter().copied().fold(f64::INFINITY, f64::min);

    let mut picks = Vec::with_capacity(n);
    for _ in 0..n {
        let model = GpModel::fit(&xs, &ys, search.noise_variance);
        let mut best: Option<(f64, Vec<f64>)> = None;
        for _ in 0..search.n_candidates.max(1) {
            let x: Vec<f64> = (0..dims).map(|_| rng.f64()).collect();
            if !feasible(&x) {
                continue;
            }
            let score = model.as_ref().map_or(0.0, |m| m.expected_improvement(&x));
            if best.as_ref().is_none_or(|(s, _)| score > *s) {
                best = Some((score, x));
            }
        }
        let Some((_, x)) = best else {
            return Err(Error::InvalidSearchSpace(
                "no candidate satisfies the parameter constraints".to_string(),
            ));
        };
        xs.push(x.clone());
        ys.push(liar);
        picks.push(x);
    }
    Ok(picks)
}
