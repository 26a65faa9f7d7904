// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Separable Gaussian smoothing with mirrored (`d c b a | a b c d`) borders.

use ndarray::{Array2, Axis};

/// Kernel support is `4σ` rounded to the nearest cell
const TRUNCATE: f64 = 4.0;

fn kernel(sigma: f64) -> (Vec<f64>, usize) {
    let radius = (TRUNCATE * sigma + 0.5) as usize;
    let weights: Vec<f64> = (-(radius as isize)..=radius as isize)
        .map(|x| (-0.5 * (x * x) as f64 / (sigma * sigma)).exp())
        .collect();
    let total: f64 = weights.iter().sum();
    (weights.into_iter().map(|w| w / total).collect(), radius)
}

/// Mirror an out-of-range index back into `0..n`, edge sample repeated
fn reflect(mut index: isize, n: usize) -> usize {
    let n = n as isize;
    while index < 0 || index >= n {
        if index < 0 {
            index = -index - 1;
        }
        if index >= n {
            index = 2 * n - index - 1;
        }
    }
    index as usize
}

fn filter_axis(input: &Array2<f64>, axis: Axis, weights: &[f64], radius: usize) -> Array2<f64> {
    let mut output = Array2::<f64>::zeros(input.raw_dim());
    for (source, mut target) in input.lanes(axis).into_iter().zip(output.lanes_mut(axis)) {
        let n = source.len();
        for i in 0..n {
            target[i] = weights
                .iter()
                .enumerate()
                .map(|(k, w)| w * source[reflect(i as isize + k as isize - radius as isize, n)])
                .sum();
        }
    }
    output
}

/// Smooth along axis 0 then axis 1 with a normalized Gaussian of width `sigma` cells
pub fn gaussian_filter(values: &Array2<f64>, sigma: f64) -> Array2<f64> {
    if values.is_empty() || !(sigma > 0.0) {
        return values.clone();
    }
    let (weights, radius) = kernel(sigma);
    let once = filter_axis(values, Axis(0), &weights, radius);
    filter_axis(&once, Axis(1), &weights, radius)
}
