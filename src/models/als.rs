use ndarray::parallel::prelude::*;
use ndarray::{Array1, Array2, Axis};
use rand_xorshift::XorShiftRng;

use super::factorization::{FactorModel, Hyperparameters};
use super::negatives::NegativeSampler;
use super::sgd::squared_norm;
use crate::encoding::EncodedRatings;

/// Added to the diagonal when the L2 penalty alone cannot keep the
/// normal equations positive definite.
const MIN_RIDGE: f64 = 1e-6;

/// (other-axis index, target, weight)
type Entry = (usize, f32, f32);

/// Solve `A x = b` for symmetric positive definite `A`, reading only
/// the lower triangle of `A`. Returns `None` if `A` is not positive definite.
fn cholesky_solve(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    let mut l = Array2::<f64>::zeros((n, n));

    for i in 0..n {
        for j in 0..=i {
            let mut sum = a[[i, j]];
            for k in 0..j {
                sum -= l[[i, k]] * l[[j, k]];
            }

            if i == j {
                if sum <= 0.0 || !sum.is_finite() {
                    return None;
                }
                l[[i, j]] = sum.sqrt();
            } else {
                l[[i, j]] = sum / l[[j, j]];
            }
        }
    }

    // L y = b
    let mut y = Array1::<f64>::zeros(n);
    for i in 0..n {
        let mut sum = b[i];
        for j in 0..i {
            sum -= l[[i, j]] * y[j];
        }
        y[i] = sum / l[[i, i]];
    }

    // Lᵀ x = y
    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let mut sum = y[i];
        for j in (i + 1)..n {
            sum -= l[[j, i]] * x[j];
        }
        x[i] = sum / l[[i, i]];
    }

    Some(x)
}

/// Ridge solve for a single factor row given the fixed factors of the
/// other axis.
fn solve_row(entries: &[Entry], other: &Array2<f32>, l2_penalty: f32) -> Option<Array1<f32>> {
    let rank = other.ncols();
    let mut a = Array2::<f64>::zeros((rank, rank));
    let mut b = Array1::<f64>::zeros(rank);

    for &(idx, target, weight) in entries {
        let factors = other.row(idx);
        let weight = f64::from(weight);

        for i in 0..rank {
            let scaled = weight * f64::from(factors[i]);
            for j in 0..=i {
                a[[i, j]] += scaled * f64::from(factors[j]);
            }
            b[i] += scaled * f64::from(target);
        }
    }

    let ridge = f64::from(l2_penalty).max(MIN_RIDGE);
    for i in 0..rank {
        a[[i, i]] += ridge;
    }

    cholesky_solve(&a, &b).map(|x| x.mapv(|value| value as f32))
}

fn solve_half(rows: &mut Array2<f32>, entries: &[Vec<Entry>], other: &Array2<f32>, l2_penalty: f32) {
    rows.axis_iter_mut(Axis(0))
        .into_par_iter()
        .zip(entries.par_iter())
        .for_each(|(mut row, entries)| {
            if entries.is_empty() {
                return;
            }
            match solve_row(entries, other, l2_penalty) {
                Some(solution) => row.assign(&solution),
                None => warn!("Normal equations not positive definite; keeping factor row"),
            }
        });
}

fn weighted_error(entries: &[Vec<Entry>], rows: &Array2<f32>, other: &Array2<f32>) -> f32 {
    entries
        .par_iter()
        .enumerate()
        .map(|(row, entries)| {
            entries
                .iter()
                .map(|&(idx, target, weight)| {
                    let error = target - rows.row(row).dot(&other.row(idx));
                    weight * error * error
                })
                .sum::<f32>()
        })
        .sum()
}

/// Run one pass of alternating least squares: solve every subject row
/// against the current object factors, then every object row against
/// the new subject factors. Rows are solved in parallel on the current
/// rayon pool; negatives are drawn once per pass, before solving.
pub fn fit_pass(
    model: &mut FactorModel,
    interactions: &EncodedRatings,
    hyper: &Hyperparameters,
    sampler: Option<&NegativeSampler>,
    rng: &mut XorShiftRng,
) -> f32 {
    let mut by_subject: Vec<Vec<Entry>> = vec![Vec::new(); interactions.num_subjects()];
    let mut by_object: Vec<Vec<Entry>> = vec![Vec::new(); interactions.num_objects()];

    for (subject, object, value) in interactions.iter() {
        by_subject[subject].push((object, value, 1.0));
        by_object[object].push((subject, value, 1.0));

        if let Some(sampler) = sampler {
            for _ in 0..hyper.num_negatives {
                let negative = sampler.sample(subject, rng);
                by_subject[subject].push((negative, hyper.negative_target, hyper.negative_weight));
                by_object[negative].push((subject, hyper.negative_target, hyper.negative_weight));
            }
        }
    }

    let (subject_factors, object_factors) = model.factors_mut();

    solve_half(subject_factors, &by_subject, object_factors, hyper.l2_penalty);
    solve_half(object_factors, &by_object, subject_factors, hyper.l2_penalty);

    weighted_error(&by_subject, subject_factors, object_factors)
        + hyper.l2_penalty * (squared_norm(subject_factors) + squared_norm(object_factors))
}
