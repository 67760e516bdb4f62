use ndarray::{Array2, Axis};
use rand::seq::SliceRandom;
use rand_xorshift::XorShiftRng;

use super::factorization::{FactorModel, Hyperparameters};
use super::negatives::NegativeSampler;
use crate::encoding::EncodedRatings;
use crate::{ObjectIndex, SubjectIndex};

/// Take a single gradient step on one (subject, object) pair, returning
/// the weighted squared error before the step.
fn sgd_step(
    subject_factors: &mut Array2<f32>,
    object_factors: &mut Array2<f32>,
    subject: SubjectIndex,
    object: ObjectIndex,
    target: f32,
    weight: f32,
    hyper: &Hyperparameters,
) -> f32 {
    let mut subject_row = subject_factors.index_axis_mut(Axis(0), subject);
    let mut object_row = object_factors.index_axis_mut(Axis(0), object);

    let error = target - subject_row.dot(&object_row);
    let scaled_error = weight * error;
    let (learning_rate, l2_penalty) = (hyper.learning_rate, hyper.l2_penalty);

    for (u, v) in subject_row.iter_mut().zip(object_row.iter_mut()) {
        let (u_old, v_old) = (*u, *v);
        *u += learning_rate * (scaled_error * v_old - l2_penalty * u_old);
        *v += learning_rate * (scaled_error * u_old - l2_penalty * v_old);
    }

    weight * error * error
}

/// Run one pass of stochastic gradient descent over `interactions`,
/// visiting them in an order freshly shuffled from `rng`. With a
/// sampler, every rating is followed by `num_negatives` sampled pairs.
pub fn fit_pass(
    model: &mut FactorModel,
    interactions: &EncodedRatings,
    hyper: &Hyperparameters,
    sampler: Option<&NegativeSampler>,
    rng: &mut XorShiftRng,
) -> f32 {
    let mut order: Vec<usize> = (0..interactions.len()).collect();
    order.shuffle(rng);

    let (subject_factors, object_factors) = model.factors_mut();
    let subjects = interactions.subject_indices();
    let objects = interactions.object_indices();
    let values = interactions.values();

    let mut loss = 0.0;

    for &idx in &order {
        let subject = subjects[idx];

        loss += sgd_step(
            subject_factors,
            object_factors,
            subject,
            objects[idx],
            values[idx],
            1.0,
            hyper,
        );

        if let Some(sampler) = sampler {
            for _ in 0..hyper.num_negatives {
                let negative = sampler.sample(subject, rng);
                loss += sgd_step(
                    subject_factors,
                    object_factors,
                    subject,
                    negative,
                    hyper.negative_target,
                    hyper.negative_weight,
                    hyper,
                );
            }
        }
    }

    loss + hyper.l2_penalty * (squared_norm(subject_factors) + squared_norm(object_factors))
}

pub fn squared_norm(factors: &Array2<f32>) -> f32 {
    factors.iter().map(|x| x * x).sum()
}
