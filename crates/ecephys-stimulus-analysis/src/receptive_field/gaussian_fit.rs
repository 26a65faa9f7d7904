// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Two-dimensional Gaussian fit of a response grid.
//!
//! Moment estimates seed a Levenberg–Marquardt least-squares fit with a
//! forward-difference Jacobian and Marquardt (diagonal) damping. The 5×5
//! damped normal equations are solved with `nalgebra`.

use nalgebra::{SMatrix, SVector};
use ndarray::{Array1, Array2, Axis};

type Vector5 = SVector<f64, 5>;
type Matrix5 = SMatrix<f64, 5, 5>;

/// `height · exp(-(((row_center - r) / row_width)² + ((col_center - c) / col_width)²) / 2)`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gaussian2D {
    pub height: f64,
    pub row_center: f64,
    pub col_center: f64,
    pub row_width: f64,
    pub col_width: f64,
}

impl Gaussian2D {
    pub fn evaluate(&self, row: f64, col: f64) -> f64 {
        let dr = (self.row_center - row) / self.row_width;
        let dc = (self.col_center - col) / self.col_width;
        self.height * (-(dr * dr + dc * dc) / 2.0).exp()
    }

    fn to_vector(self) -> Vector5 {
        Vector5::new(
            self.height,
            self.row_center,
            self.col_center,
            self.row_width,
            self.col_width,
        )
    }

    fn from_vector(p: &Vector5) -> Self {
        Self {
            height: p[0],
            row_center: p[1],
            col_center: p[2],
            row_width: p[3],
            col_width: p[4],
        }
    }
}

/// Moment-based starting point
///
/// Centers are the mass-weighted mean indices. Each width is taken from
/// the single row or column through the truncated center, measured against
/// the other axis' center; this matches the classic `fitgaussian` recipe
/// the reference fixtures were produced with. `None` when the grid has no
/// mass.
pub fn moments(values: &Array2<f64>) -> Option<Gaussian2D> {
    let (rows, cols) = values.dim();
    if rows == 0 || cols == 0 {
        return None;
    }
    let total = values.sum();
    if total == 0.0 {
        return None;
    }

    let mut row_moment = 0.0;
    let mut col_moment = 0.0;
    for ((r, c), &v) in values.indexed_iter() {
        row_moment += r as f64 * v;
        col_moment += c as f64 * v;
    }
    let row_center = row_moment / total;
    let col_center = col_moment / total;
    if !(row_center.is_finite() && col_center.is_finite()) {
        return None;
    }

    let center_col = (col_center as usize).min(cols - 1);
    let column = values.column(center_col);
    let row_width = (column
        .iter()
        .enumerate()
        .map(|(k, v)| (k as f64 - col_center).powi(2) * v)
        .sum::<f64>()
        .abs()
        / column.sum())
    .sqrt();

    let center_row = (row_center as usize).min(rows - 1);
    let row = values.row(center_row);
    let col_width = (row
        .iter()
        .enumerate()
        .map(|(k, v)| (k as f64 - row_center).powi(2) * v)
        .sum::<f64>()
        .abs()
        / row.sum())
    .sqrt();

    Some(Gaussian2D {
        height: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        row_center,
        col_center,
        row_width,
        col_width,
    })
}

/// Mass-weighted second-moment spread of each axis about its own center
///
/// Returns `(row_spread, col_spread)`. An axis whose mass sits in a single
/// row (or column) has a spread of exactly zero. `None` when the grid has no
/// mass.
pub fn axis_spread(values: &Array2<f64>) -> Option<(f64, f64)> {
    if values.is_empty() || values.sum() == 0.0 {
        return None;
    }
    Some((
        marginal_spread(&values.sum_axis(Axis(1))),
        marginal_spread(&values.sum_axis(Axis(0))),
    ))
}

fn marginal_spread(mass: &Array1<f64>) -> f64 {
    if mass.iter().filter(|&&m| m != 0.0).count() <= 1 {
        return 0.0;
    }
    let total = mass.sum();
    let center = mass.iter().enumerate().map(|(k, m)| k as f64 * m).sum::<f64>() / total;
    (mass
        .iter()
        .enumerate()
        .map(|(k, m)| (k as f64 - center).powi(2) * m)
        .sum::<f64>()
        .abs()
        / total)
        .sqrt()
}

/// Levenberg–Marquardt stopping rules
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitOptions {
    pub max_iterations: usize,
    /// Relative reduction of the sum of squares
    pub ftol: f64,
    /// Relative step size per parameter
    pub xtol: f64,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            ftol: 1.49012e-8,
            xtol: 1.49012e-8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitOutcome {
    pub params: Gaussian2D,
    pub converged: bool,
    pub iterations: usize,
}

const INITIAL_DAMPING: f64 = 1e-3;
const MAX_DAMPING: f64 = 1e300;
const MIN_SCALE: f64 = 1e-300;

struct Problem<'a> {
    values: &'a Array2<f64>,
}

impl Problem<'_> {
    fn residuals(&self, p: &Vector5) -> Vec<f64> {
        let model = Gaussian2D::from_vector(p);
        self.values
            .indexed_iter()
            .map(|((r, c), &v)| model.evaluate(r as f64, c as f64) - v)
            .collect()
    }

    fn jacobian(&self, p: &Vector5, residuals: &[f64]) -> Vec<[f64; 5]> {
        let eps = f64::EPSILON.sqrt();
        let mut jacobian = vec![[0.0; 5]; residuals.len()];
        for k in 0..5 {
            let step = if p[k] == 0.0 { eps } else { eps * p[k].abs() };
            let mut shifted = *p;
            shifted[k] += step;
            for (row, (moved, base)) in jacobian.iter_mut().zip(self.residuals(&shifted).iter().zip(residuals)) {
                row[k] = (moved - base) / step;
            }
        }
        jacobian
    }
}

fn sum_of_squares(residuals: &[f64]) -> f64 {
    residuals.iter().map(|r| r * r).sum()
}

/// Least-squares fit of [`Gaussian2D`] to `values`, starting at `initial`
///
/// `converged` is false when the iteration budget runs out, the damped
/// system becomes singular or the damping diverges; `params` then holds the
/// last accepted estimate.
pub fn fit_gaussian(values: &Array2<f64>, initial: Gaussian2D, options: &FitOptions) -> FitOutcome {
    let problem = Problem { values };
    let mut p = initial.to_vector();
    let mut residuals = problem.residuals(&p);
    let mut cost = sum_of_squares(&residuals);
    let mut damping = INITIAL_DAMPING;
    let mut growth = 2.0;

    let done = |p: &Vector5, converged: bool, iterations: usize| FitOutcome {
        params: Gaussian2D::from_vector(p),
        converged,
        iterations,
    };

    if !cost.is_finite() {
        return done(&p, false, 0);
    }

    for iteration in 0..options.max_iterations {
        let jacobian = problem.jacobian(&p, &residuals);
        let mut normal = Matrix5::zeros();
        let mut gradient = Vector5::zeros();
        for (row, &r) in jacobian.iter().zip(&residuals) {
            for a in 0..5 {
                gradient[a] += row[a] * r;
                for b in 0..5 {
                    normal[(a, b)] += row[a] * row[b];
                }
            }
        }
        if gradient.amax() == 0.0 {
            return done(&p, true, iteration);
        }
        let scale = Vector5::from_fn(|k, _| normal[(k, k)].max(MIN_SCALE));

        loop {
            let mut damped = normal;
            for k in 0..5 {
                damped[(k, k)] += damping * scale[k];
            }
            let Some(step) = damped.lu().solve(&(-gradient)) else {
                return done(&p, false, iteration);
            };

            let small_step = (0..5).all(|k| step[k].abs() <= options.xtol * (p[k].abs() + options.xtol));
            if small_step {
                return done(&p, true, iteration);
            }

            let candidate = p + step;
            let candidate_residuals = problem.residuals(&candidate);
            let candidate_cost = sum_of_squares(&candidate_residuals);
            let predicted: f64 = (0..5)
                .map(|k| step[k] * (damping * scale[k] * step[k] - gradient[k]))
                .sum();
            let gain = if predicted > 0.0 {
                (cost - candidate_cost) / predicted
            } else {
                -1.0
            };

            if gain > 0.0 && candidate_cost.is_finite() {
                let reduction = if cost > 0.0 {
                    (cost - candidate_cost) / cost
                } else {
                    0.0
                };
                p = candidate;
                residuals = candidate_residuals;
                cost = candidate_cost;
                damping *= (1.0f64 / 3.0).max(1.0 - (2.0 * gain - 1.0).powi(3));
                growth = 2.0;
                if reduction <= options.ftol {
                    return done(&p, true, iteration + 1);
                }
                break;
            }

            damping *= growth;
            growth *= 2.0;
            if !damping.is_finite() || damping > MAX_DAMPING {
                return done(&p, false, iteration);
            }
        }
    }

    done(&p, false, options.max_iterations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sampled(model: Gaussian2D, rows: usize, cols: usize) -> Array2<f64> {
        Array2::from_shape_fn((rows, cols), |(r, c)| model.evaluate(r as f64, c as f64))
    }

    #[test]
    fn test_moments_measure_against_opposite_center() {
        let mut values = Array2::<f64>::zeros((5, 5));
        values[[1, 3]] = 2.0;
        let start = moments(&values).unwrap();
        assert_eq!((start.row_center, start.col_center), (1.0, 3.0));
        assert_eq!(start.height, 2.0);
        // |1 - 3| on both axes
        assert_eq!((start.row_width, start.col_width), (2.0, 2.0));

        values[[1, 3]] = 0.0;
        values[[2, 2]] = 2.0;
        let start = moments(&values).unwrap();
        assert_eq!((start.row_width, start.col_width), (0.0, 0.0));
    }

    #[test]
    fn test_axis_spread_single_cell_is_zero() {
        for (row, col) in [(0, 8), (3, 5), (1, 7), (8, 8)] {
            let mut values = Array2::<f64>::zeros((9, 9));
            values[[row, col]] = 5.0;
            assert_eq!(axis_spread(&values), Some((0.0, 0.0)));
        }
        let mut strip = Array2::<f64>::zeros((1, 9));
        strip[[0, 3]] = 5.0;
        assert_eq!(axis_spread(&strip), Some((0.0, 0.0)));
    }

    #[test]
    fn test_axis_spread_of_a_line() {
        let mut values = Array2::<f64>::zeros((9, 9));
        for col in 2..7 {
            values[[4, col]] = 1.0;
        }
        let (row_spread, col_spread) = axis_spread(&values).unwrap();
        assert_eq!(row_spread, 0.0);
        assert_relative_eq!(col_spread, 2.0f64.sqrt(), epsilon = 1e-12);
        assert!(axis_spread(&Array2::<f64>::zeros((3, 3))).is_none());
    }

    #[test]
    fn test_moments_empty_mass() {
        assert!(moments(&Array2::<f64>::zeros((4, 4))).is_none());
    }

    #[test]
    fn test_recovers_anisotropic_gaussian() {
        let truth = Gaussian2D {
            height: 3.0,
            row_center: 6.2,
            col_center: 4.7,
            row_width: 1.5,
            col_width: 2.5,
        };
        let values = sampled(truth, 13, 11);
        let start = moments(&values).unwrap();
        let outcome = fit_gaussian(&values, start, &FitOptions::default());

        assert!(outcome.converged);
        assert_relative_eq!(outcome.params.height, 3.0, epsilon = 1e-5);
        assert_relative_eq!(outcome.params.row_center, 6.2, epsilon = 1e-5);
        assert_relative_eq!(outcome.params.col_center, 4.7, epsilon = 1e-5);
        assert_relative_eq!(outcome.params.row_width.abs(), 1.5, epsilon = 1e-5);
        assert_relative_eq!(outcome.params.col_width.abs(), 2.5, epsilon = 1e-5);
    }

    #[test]
    fn test_iteration_budget_reported() {
        let truth = Gaussian2D {
            height: 1.0,
            row_center: 4.0,
            col_center: 4.0,
            row_width: 2.0,
            col_width: 2.0,
        };
        let values = sampled(truth, 9, 9);
        let start = moments(&values).unwrap();
        let options = FitOptions {
            max_iterations: 1,
            ..FitOptions::default()
        };
        let outcome = fit_gaussian(&values, start, &options);
        assert!(!outcome.converged);
        assert_eq!(outcome.iterations, 1);
    }
}
