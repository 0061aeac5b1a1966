//! Random-intercept linear mixed model fitted by REML.
//!
//! Model: `y = X beta + Z u + e`, with `X` holding an intercept plus one
//! treatment dummy per non-baseline group, `Z` the image indicator,
//! `u ~ N(0, sigma_u^2)` one intercept per image and `e ~ N(0, sigma_e^2)`.
//!
//! The variance ratio `lambda = sigma_u^2 / sigma_e^2` is the only parameter
//! optimized numerically; `beta` and `sigma_e^2` are profiled out. For a
//! cluster of size `n` the marginal covariance is `sigma_e^2 (I + lambda J)`
//! whose inverse is `I - w J` with `w = lambda / (1 + n lambda)`, so every
//! evaluation is a single pass over the rows plus a `p x p` Cholesky.
//!
//! The search is a log-spaced grid over `lambda` followed by golden-section
//! refinement, with `lambda = 0` evaluated as the boundary candidate. The
//! boundary wins ties within [`BOUNDARY_TOLERANCE`]. When every image holds a
//! single series the profile is flat in `lambda` (the two variances cannot be
//! separated), so the fit is taken at `lambda = 0` directly. A
//! maximum on the upper edge of the grid, a singular fixed-effect system, no
//! residual degrees of freedom or a vanishing residual variance all reject
//! the fit with [`Error::ModelConvergence`]. There is no fallback to OLS.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::preprocess::{Measure, MeasurementTable};

/// Lower end of the `ln(lambda)` search grid.
const LOG_LAMBDA_MIN: f64 = -15.0;
/// Upper end of the `ln(lambda)` search grid.
const LOG_LAMBDA_MAX: f64 = 10.0;
/// Grid spacing in `ln(lambda)`.
const LOG_LAMBDA_STEP: f64 = 0.5;
/// Golden-section stopping width in `ln(lambda)`.
const TOLERANCE: f64 = 1e-8;
/// Iteration cap for the golden-section refinement.
pub const MAX_ITERATIONS: usize = 200;
/// Relative log-likelihood margin within which `lambda = 0` is preferred.
pub const BOUNDARY_TOLERANCE: f64 = 1e-9;

/// Result of a converged REML fit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MixedModelFit {
    /// Modelled column.
    pub dependent_variable: Measure,
    /// Groups in coefficient order; the first is the baseline.
    pub group_names: Vec<String>,
    /// Intercept followed by one treatment effect per non-baseline group.
    pub coefficients: Vec<f64>,
    /// Covariance of the coefficients (row-major, `p x p`).
    pub covariance: Vec<Vec<f64>>,
    /// Within-image (residual) variance.
    pub residual_variance: f64,
    /// Between-image random-intercept variance.
    pub random_intercept_variance: f64,
    /// Profiled REML log-likelihood at the optimum.
    pub reml_log_likelihood: f64,
    /// Likelihood evaluations spent in the search.
    pub iterations: usize,
    /// Number of observations (series rows).
    pub n_obs: usize,
    /// Number of images (random-effect levels).
    pub n_images: usize,
}

/// A linear combination of fixed effects with its standard error.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contrast {
    /// Estimated value of the combination.
    pub estimate: f64,
    /// Standard error from the coefficient covariance.
    pub se: f64,
}

impl MixedModelFit {
    fn coefficient_index(&self, group: &str) -> Option<Option<usize>> {
        let pos = self.group_names.iter().position(|g| g == group)?;
        Some(if pos == 0 { None } else { Some(pos) })
    }

    /// Contrast vector for `group1 - group2`.
    #[must_use]
    pub fn contrast_vector(&self, group1: &str, group2: &str) -> Option<Vec<f64>> {
        let mut c = vec![0.0; self.coefficients.len()];
        if let Some(idx) = self.coefficient_index(group1)? {
            c[idx] += 1.0;
        }
        if let Some(idx) = self.coefficient_index(group2)? {
            c[idx] -= 1.0;
        }
        Some(c)
    }

    /// Estimate and standard error of `mean(group1) - mean(group2)`.
    ///
    /// Returns `None` if either group was not part of the fit.
    #[must_use]
    pub fn contrast(&self, group1: &str, group2: &str) -> Option<Contrast> {
        let c = self.contrast_vector(group1, group2)?;
        let estimate = dot(&c, &self.coefficients);
        let variance: f64 = c
            .iter()
            .zip(&self.covariance)
            .map(|(ci, row)| ci * dot(row, &c))
            .sum();
        Some(Contrast {
            estimate,
            se: variance.max(0.0).sqrt(),
        })
    }

    /// Model-based mean of one group.
    #[must_use]
    pub fn group_mean(&self, group: &str) -> Option<f64> {
        let idx = self.coefficient_index(group)?;
        Some(self.coefficients[0] + idx.map_or(0.0, |i| self.coefficients[i]))
    }
}

/// Observations arranged for repeated likelihood evaluation.
struct Design {
    p: usize,
    /// Row-major `n x p` fixed-effect design.
    x: Vec<f64>,
    y: Vec<f64>,
    /// Row indices of each image.
    clusters: Vec<Vec<usize>>,
}

impl Design {
    fn n(&self) -> usize {
        self.y.len()
    }

    fn row(&self, i: usize) -> &[f64] {
        &self.x[i * self.p..(i + 1) * self.p]
    }
}

/// One profiled likelihood evaluation.
struct Evaluation {
    lambda: f64,
    beta: Vec<f64>,
    a_inverse: Vec<f64>,
    sigma2: f64,
    log_likelihood: f64,
}

/// Fit `measure ~ C(group)` with a random intercept per image.
pub fn fit_random_intercept(table: &MeasurementTable, measure: Measure) -> Result<MixedModelFit> {
    let group_names = table.groups();
    let fail = |reason: String| Error::ModelConvergence {
        dependent_variable: measure.name().to_string(),
        groups: group_names.join(", "),
        reason,
    };

    let design = build_design(table, measure, &group_names);
    let n = design.n();
    if n <= design.p {
        return Err(fail(format!(
            "no residual degrees of freedom ({n} observations, {} fixed effects)",
            design.p
        )));
    }

    let y_mean = design.y.iter().sum::<f64>() / n as f64;
    let y_scale = design.y.iter().map(|v| (v - y_mean).powi(2)).sum::<f64>() / n as f64;
    if y_scale <= 0.0 || !y_scale.is_finite() {
        return Err(fail("dependent variable has no variance".to_string()));
    }

    if design.clusters.iter().all(|rows| rows.len() == 1) {
        tracing::debug!(
            measure = %measure,
            "one series per image; random-intercept variance not identifiable, fitting at lambda = 0"
        );
        let zero = evaluate(&design, 0.0).map_err(&fail)?;
        return Ok(finish(measure, group_names, &design, zero, 1));
    }

    let mut evaluations = 0usize;
    let mut eval = |log_lambda: Option<f64>| {
        evaluations += 1;
        evaluate(&design, log_lambda.map_or(0.0, f64::exp))
    };

    // Coarse scan.
    let steps = ((LOG_LAMBDA_MAX - LOG_LAMBDA_MIN) / LOG_LAMBDA_STEP).round() as usize;
    let grid: Vec<f64> = (0..=steps)
        .map(|i| LOG_LAMBDA_MIN + i as f64 * LOG_LAMBDA_STEP)
        .collect();
    let mut best: Option<(usize, f64)> = None;
    let mut last_failure = None;
    for (i, &theta) in grid.iter().enumerate() {
        match eval(Some(theta)) {
            Ok(e) => {
                if best.is_none_or(|(_, ll)| e.log_likelihood > ll) {
                    best = Some((i, e.log_likelihood));
                }
            }
            Err(reason) => last_failure = Some(reason),
        }
    }
    let boundary = eval(None);

    let Some((best_idx, best_ll)) = best else {
        return Err(fail(last_failure.unwrap_or_else(|| "no finite likelihood".to_string())));
    };

    let margin = BOUNDARY_TOLERANCE * best_ll.abs().max(1.0);
    let boundary_wins = matches!(&boundary, Ok(zero) if zero.log_likelihood >= best_ll - margin);
    if boundary_wins {
        tracing::debug!(measure = %measure, "REML optimum on the lambda = 0 boundary");
        let zero = boundary.map_err(fail)?;
        return Ok(finish(measure, group_names, &design, zero, evaluations));
    }

    if best_idx == grid.len() - 1 {
        return Err(fail(format!(
            "variance ratio diverged (ln lambda reached {LOG_LAMBDA_MAX}); \
             series within images are nearly identical"
        )));
    }

    // Golden-section refinement inside the bracketing grid cells.
    let mut lo = grid[best_idx.saturating_sub(1)];
    let mut hi = grid[best_idx + 1];
    let ratio = (5f64.sqrt() - 1.0) / 2.0;
    let neg_ll = |e: std::result::Result<Evaluation, String>| {
        e.map(|e| -e.log_likelihood).unwrap_or(f64::INFINITY)
    };
    let mut c = hi - ratio * (hi - lo);
    let mut d = lo + ratio * (hi - lo);
    let mut fc = neg_ll(eval(Some(c)));
    let mut fd = neg_ll(eval(Some(d)));
    let mut iterations = 0;
    while (hi - lo).abs() > TOLERANCE {
        if iterations >= MAX_ITERATIONS {
            return Err(fail(format!(
                "golden-section search did not converge in {MAX_ITERATIONS} iterations"
            )));
        }
        iterations += 1;
        if fc < fd {
            hi = d;
            d = c;
            fd = fc;
            c = hi - ratio * (hi - lo);
            fc = neg_ll(eval(Some(c)));
        } else {
            lo = c;
            c = d;
            fc = fd;
            d = lo + ratio * (hi - lo);
            fd = neg_ll(eval(Some(d)));
        }
    }

    let optimum = eval(Some(0.5 * (lo + hi))).map_err(&fail)?;
    if !optimum.log_likelihood.is_finite() {
        return Err(fail("non-finite likelihood at optimum".to_string()));
    }
    tracing::debug!(
        measure = %measure,
        lambda = optimum.lambda,
        iterations,
        "REML optimum found"
    );
    Ok(finish(measure, group_names, &design, optimum, evaluations))
}

fn finish(
    measure: Measure,
    group_names: Vec<String>,
    design: &Design,
    e: Evaluation,
    iterations: usize,
) -> MixedModelFit {
    let p = design.p;
    let covariance = (0..p)
        .map(|i| (0..p).map(|j| e.sigma2 * e.a_inverse[i * p + j]).collect())
        .collect();

    let fit = MixedModelFit {
        dependent_variable: measure,
        group_names,
        coefficients: e.beta,
        covariance,
        residual_variance: e.sigma2,
        random_intercept_variance: e.lambda * e.sigma2,
        reml_log_likelihood: e.log_likelihood,
        iterations,
        n_obs: design.n(),
        n_images: design.clusters.len(),
    };

    tracing::info!(
        measure = %measure,
        n_obs = fit.n_obs,
        n_images = fit.n_images,
        residual_variance = fit.residual_variance,
        random_intercept_variance = fit.random_intercept_variance,
        "fitted random-intercept model"
    );
    fit
}

fn build_design(table: &MeasurementTable, measure: Measure, group_names: &[String]) -> Design {
    let p = group_names.len().max(1);
    let position: BTreeMap<&str, usize> = group_names
        .iter()
        .enumerate()
        .map(|(i, g)| (g.as_str(), i))
        .collect();

    let mut x = Vec::with_capacity(table.len() * p);
    let mut y = Vec::with_capacity(table.len());
    let mut cluster_of: BTreeMap<&str, usize> = BTreeMap::new();
    let mut clusters: Vec<Vec<usize>> = Vec::new();

    for (i, row) in table.rows().iter().enumerate() {
        let mut xi = vec![0.0; p];
        xi[0] = 1.0;
        if let Some(&g) = position.get(row.group.as_str()) {
            if g > 0 {
                xi[g] = 1.0;
            }
        }
        x.extend_from_slice(&xi);
        y.push(measure.value(row));

        let next = clusters.len();
        let c = *cluster_of.entry(row.image_id.as_str()).or_insert(next);
        if c == next {
            clusters.push(Vec::new());
        }
        clusters[c].push(i);
    }

    Design { p, x, y, clusters }
}

/// Profiled REML log-likelihood at a fixed variance ratio.
fn evaluate(design: &Design, lambda: f64) -> std::result::Result<Evaluation, String> {
    let p = design.p;
    let n = design.n();
    let mut a = vec![0.0; p * p];
    let mut b = vec![0.0; p];
    let mut log_det_v = 0.0;

    for rows in &design.clusters {
        let size = rows.len() as f64;
        let w = lambda / (1.0 + size * lambda);
        log_det_v += (1.0 + size * lambda).ln();

        let mut s = vec![0.0; p];
        let mut t = 0.0;
        for &r in rows {
            let xr = design.row(r);
            let yr = design.y[r];
            for j in 0..p {
                s[j] += xr[j];
                b[j] += xr[j] * yr;
                for k in 0..p {
                    a[j * p + k] += xr[j] * xr[k];
                }
            }
            t += yr;
        }
        for j in 0..p {
            b[j] -= w * s[j] * t;
            for k in 0..p {
                a[j * p + k] -= w * s[j] * s[k];
            }
        }
    }

    let l = cholesky(&a, p).ok_or_else(|| "fixed-effect system is singular".to_string())?;
    let beta = cholesky_solve(&l, p, &b);
    let log_det_a: f64 = (0..p).map(|i| 2.0 * l[i * p + i].ln()).sum();

    let mut q = 0.0;
    for rows in &design.clusters {
        let size = rows.len() as f64;
        let w = lambda / (1.0 + size * lambda);
        let mut sum_r = 0.0;
        let mut sum_r2 = 0.0;
        for &r in rows {
            let resid = design.y[r] - dot(design.row(r), &beta);
            sum_r += resid;
            sum_r2 += resid * resid;
        }
        q += sum_r2 - w * sum_r * sum_r;
    }

    let dof = (n - p) as f64;
    let sigma2 = q / dof;
    if !sigma2.is_finite() || sigma2 <= 0.0 {
        return Err("residual variance collapsed to zero".to_string());
    }

    let log_likelihood = -0.5
        * (dof * ((2.0 * std::f64::consts::PI * sigma2).ln() + 1.0) + log_det_v + log_det_a);
    if !log_likelihood.is_finite() {
        return Err("non-finite likelihood".to_string());
    }

    let mut a_inverse = vec![0.0; p * p];
    for j in 0..p {
        let mut unit = vec![0.0; p];
        unit[j] = 1.0;
        let col = cholesky_solve(&l, p, &unit);
        for i in 0..p {
            a_inverse[i * p + j] = col[i];
        }
    }

    Ok(Evaluation {
        lambda,
        beta,
        a_inverse,
        sigma2,
        log_likelihood,
    })
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Lower-triangular Cholesky factor of a symmetric positive-definite matrix.
fn cholesky(a: &[f64], p: usize) -> Option<Vec<f64>> {
    let mut l = vec![0.0; p * p];
    for i in 0..p {
        for j in 0..=i {
            let mut sum = a[i * p + j];
            for k in 0..j {
                sum -= l[i * p + k] * l[j * p + k];
            }
            if i == j {
                if sum <= 1e-12 * a[i * p + i].abs().max(f64::MIN_POSITIVE) {
                    return None;
                }
                l[i * p + i] = sum.sqrt();
            } else {
                l[i * p + j] = sum / l[j * p + j];
            }
        }
    }
    Some(l)
}

/// Solve `L L' x = b`.
fn cholesky_solve(l: &[f64], p: usize, b: &[f64]) -> Vec<f64> {
    let mut z = vec![0.0; p];
    for i in 0..p {
        let mut sum = b[i];
        for k in 0..i {
            sum -= l[i * p + k] * z[k];
        }
        z[i] = sum / l[i * p + i];
    }
    let mut x = vec![0.0; p];
    for i in (0..p).rev() {
        let mut sum = z[i];
        for k in i + 1..p {
            sum -= l[k * p + i] * x[k];
        }
        x[i] = sum / l[i * p + i];
    }
    x
}
