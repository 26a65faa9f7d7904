// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Label-shuffle significance of position-dependent responses.

use rand::seq::SliceRandom;
use rand::Rng;

/// Relative slack so a shuffle reproducing the observed grouping counts as
/// "at least as extreme" despite summation-order rounding
const TIE_TOLERANCE: f64 = 1e-12;

/// `Σ_c (O_c − E_c)² / E_c` with `O_c` the summed response of category `c`
/// and `E_c = total · n_c / N`
///
/// NaN when the total response is zero or non-finite.
pub fn chi_square_statistic(responses: &[f64], categories: &[usize]) -> f64 {
    let n_categories = categories.iter().copied().max().map_or(0, |m| m + 1);
    let mut observed = vec![0.0; n_categories];
    let mut trials = vec![0usize; n_categories];
    for (&response, &category) in responses.iter().zip(categories) {
        observed[category] += response;
        trials[category] += 1;
    }

    let total: f64 = observed.iter().sum();
    if total == 0.0 || !total.is_finite() {
        return f64::NAN;
    }
    let n = responses.len().min(categories.len()) as f64;

    observed
        .iter()
        .zip(&trials)
        .filter(|(_, count)| **count > 0)
        .map(|(&o, &count)| {
            let expected = total * count as f64 / n;
            (o - expected).powi(2) / expected
        })
        .sum()
}

/// Fraction of `shuffles` label permutations whose statistic reaches the
/// observed one
///
/// `responses[i]` is trial `i`'s response and `categories[i]` its
/// condition index. NaN when the statistic is undefined or no shuffles are
/// requested.
pub fn chi_square_permutation<R: Rng + ?Sized>(
    responses: &[f64],
    categories: &[usize],
    shuffles: usize,
    rng: &mut R,
) -> f64 {
    let observed = chi_square_statistic(responses, categories);
    if observed.is_nan() || shuffles == 0 {
        return f64::NAN;
    }

    let floor = observed - observed.abs() * TIE_TOLERANCE;
    let mut labels = categories.to_vec();
    let mut extreme = 0usize;
    for _ in 0..shuffles {
        labels.shuffle(rng);
        if chi_square_statistic(responses, &labels) >= floor {
            extreme += 1;
        }
    }
    extreme as f64 / shuffles as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_statistic_by_hand() {
        // totals: category 0 -> 6, category 1 -> 2; expected 4 each
        let stat = chi_square_statistic(&[3.0, 3.0, 1.0, 1.0], &[0, 0, 1, 1]);
        assert_relative_eq!(stat, 2.0);
        assert!(chi_square_statistic(&[0.0, 0.0], &[0, 1]).is_nan());
    }

    #[test]
    fn test_uniform_response_not_significant() {
        let responses = vec![2.0; 40];
        let categories: Vec<usize> = (0..40).map(|i| i % 8).collect();
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(chi_square_permutation(&responses, &categories, 200, &mut rng), 1.0);
    }

    #[test]
    fn test_selective_response_significant() {
        let categories: Vec<usize> = (0..90).map(|i| i % 9).collect();
        let responses: Vec<f64> = categories
            .iter()
            .map(|&c| if c == 4 { 12.0 } else { 1.0 })
            .collect();
        let mut rng = StdRng::seed_from_u64(7);
        let p = chi_square_permutation(&responses, &categories, 500, &mut rng);
        assert!(p < 0.01, "p = {}", p);
    }

    #[test]
    fn test_seeded_shuffles_are_reproducible() {
        let categories: Vec<usize> = (0..30).map(|i| i % 5).collect();
        let responses: Vec<f64> = (0..30).map(|i| ((i * 7) % 4) as f64).collect();
        let a = chi_square_permutation(&responses, &categories, 100, &mut StdRng::seed_from_u64(3));
        let b = chi_square_permutation(&responses, &categories, 100, &mut StdRng::seed_from_u64(3));
        assert_eq!(a, b);
    }
}
