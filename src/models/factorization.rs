//! Latent-factor model: a rating is the inner product of a subject
//! factor row and an object factor row.
//!
//! ```text
//! r(s, o) = U[s] · V[o]
//! ```
//!
//! The factors are fitted by minimizing
//!
//! ```text
//! Σ w (t − U[s] · V[o])² + λ (‖U‖² + ‖V‖²)
//! ```
//!
//! over the observed pairs (and, for the one-class loss, over sampled
//! unobserved pairs), for a fixed number of passes.
use rand;
use rand::distributions::{Distribution, Uniform};
use rand::{Rng, SeedableRng};
use rand_xorshift::XorShiftRng;
use rayon;

use ndarray::Array2;

use super::super::{
    Axis, FittingError, ObjectIndex, PredictionError, RatingModel, SubjectIndex,
};
use super::negatives::NegativeSampler;
use super::{als, sgd, Loss, Solver};
use crate::encoding::EncodedRatings;

fn embedding_init<R: Rng>(rows: usize, cols: usize, rng: &mut R) -> Array2<f32> {
    let uniform = Uniform::new_inclusive(-1.0, 1.0);
    let scale = 1.0 / (cols as f32).sqrt();

    Array2::from_shape_simple_fn((rows, cols), || uniform.sample(rng) * scale)
}

/// Hyperparameters describing the factorization model.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Hyperparameters {
    pub(super) rank: usize,
    pub(super) num_iterations: usize,
    pub(super) l2_penalty: f32,
    pub(super) learning_rate: f32,
    pub(super) loss: Loss,
    pub(super) solver: Solver,
    pub(super) num_negatives: usize,
    pub(super) negative_weight: f32,
    pub(super) negative_target: f32,
    seed: u64,
    num_threads: usize,
}

impl Hyperparameters {
    /// Build new hyperparameters from the settings every fit needs.
    ///
    /// `learning_rate` is only used by [`Solver::GradientDescent`].
    pub fn new(
        rank: usize,
        num_iterations: usize,
        l2_penalty: f32,
        learning_rate: f32,
        loss: Loss,
    ) -> Self {
        Hyperparameters {
            rank,
            num_iterations,
            l2_penalty,
            learning_rate,
            loss,
            solver: Solver::AlternatingLeastSquares,
            num_negatives: 1,
            negative_weight: 1.0,
            negative_target: 0.0,
            seed: rand::thread_rng().gen(),
            num_threads: rayon::current_num_threads(),
        }
    }

    /// Set the factor rank.
    pub fn rank(mut self, rank: usize) -> Self {
        self.rank = rank;
        self
    }

    /// Set the number of passes over the data.
    pub fn num_iterations(mut self, num_iterations: usize) -> Self {
        self.num_iterations = num_iterations;
        self
    }

    /// Set the L2 penalty.
    pub fn l2_penalty(mut self, l2_penalty: f32) -> Self {
        self.l2_penalty = l2_penalty;
        self
    }

    /// Set the learning rate.
    pub fn learning_rate(mut self, learning_rate: f32) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    /// Set the loss function.
    pub fn loss(mut self, loss: Loss) -> Self {
        self.loss = loss;
        self
    }

    /// Set the solver.
    pub fn solver(mut self, solver: Solver) -> Self {
        self.solver = solver;
        self
    }

    /// Set the number of unobserved objects sampled per observed pair
    /// under the one-class loss.
    pub fn num_negatives(mut self, num_negatives: usize) -> Self {
        self.num_negatives = num_negatives;
        self
    }

    /// Set the weight of sampled unobserved pairs.
    pub fn negative_weight(mut self, negative_weight: f32) -> Self {
        self.negative_weight = negative_weight;
        self
    }

    /// Set the target value of sampled unobserved pairs.
    pub fn negative_target(mut self, negative_target: f32) -> Self {
        self.negative_target = negative_target;
        self
    }

    /// Set the seed for initialization, shuffling and negative sampling.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set number of threads to be used.
    pub fn num_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = num_threads;
        self
    }

    /// Set hyperparameters randomly: useful for hyperparameter search.
    pub fn random<R: Rng>(rng: &mut R) -> Self {
        Hyperparameters {
            rank: 2_usize.pow(Uniform::new(2, 8).sample(rng)),
            num_iterations: Uniform::new(5, 50).sample(rng),
            l2_penalty: (10.0_f32).powf(Uniform::new(-3.0, 0.5).sample(rng)),
            learning_rate: (10.0_f32).powf(Uniform::new(-3.0, -0.5).sample(rng)),
            loss: Loss::SquaredError,
            solver: if Uniform::new(0.0, 1.0).sample(rng) < 0.5 {
                Solver::AlternatingLeastSquares
            } else {
                Solver::GradientDescent
            },
            num_negatives: 1,
            negative_weight: 1.0,
            negative_target: 0.0,
            seed: rng.gen(),
            num_threads: rayon::current_num_threads(),
        }
    }

    fn validate(&self) -> Result<(), FittingError> {
        let invalid = |reason: &str| -> Result<(), FittingError> {
            Err(FittingError::InvalidConfig {
                reason: reason.to_owned(),
            })
        };

        if self.rank == 0 {
            return invalid("rank must be positive");
        }
        if !(self.l2_penalty.is_finite() && self.l2_penalty >= 0.0) {
            return invalid("l2 penalty must be a non-negative number");
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return invalid("learning rate must be a positive number");
        }
        if !(self.negative_weight.is_finite() && self.negative_weight >= 0.0) {
            return invalid("negative weight must be a non-negative number");
        }
        if !self.negative_target.is_finite() {
            return invalid("negative target must be finite");
        }
        if self.num_threads == 0 {
            return invalid("number of threads must be positive");
        }

        Ok(())
    }

    /// Validate the hyperparameters and build a trainer.
    pub fn build(self) -> Result<Trainer, FittingError> {
        self.validate()?;

        let rng = XorShiftRng::seed_from_u64(self.seed);

        Ok(Trainer { hyper: self, rng })
    }
}

/// A fitted factorization model. Read-only once returned by the trainer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FactorModel {
    subject_factors: Array2<f32>,
    object_factors: Array2<f32>,
}

impl FactorModel {
    /// Build a model from explicit factor matrices, one row per index.
    pub fn from_factors(
        subject_factors: Array2<f32>,
        object_factors: Array2<f32>,
    ) -> Result<Self, FittingError> {
        if subject_factors.ncols() != object_factors.ncols() {
            return Err(FittingError::InvalidConfig {
                reason: format!(
                    "subject rank {} differs from object rank {}",
                    subject_factors.ncols(),
                    object_factors.ncols()
                ),
            });
        }

        Ok(FactorModel {
            subject_factors,
            object_factors,
        })
    }

    /// Randomly initialized factors, as the trainer starts from them.
    pub fn random<R: Rng>(num_subjects: usize, num_objects: usize, rank: usize, rng: &mut R) -> Self {
        let subject_factors = embedding_init(num_subjects, rank, rng);
        let object_factors = embedding_init(num_objects, rank, rng);

        FactorModel {
            subject_factors,
            object_factors,
        }
    }

    /// The shared inner dimension of the factors.
    pub fn rank(&self) -> usize {
        self.subject_factors.ncols()
    }

    /// Subject factor matrix.
    pub fn subject_factors(&self) -> &Array2<f32> {
        &self.subject_factors
    }

    /// Object factor matrix.
    pub fn object_factors(&self) -> &Array2<f32> {
        &self.object_factors
    }

    fn is_finite(&self) -> bool {
        self.subject_factors
            .iter()
            .chain(self.object_factors.iter())
            .all(|x| x.is_finite())
    }

    pub(crate) fn factors_mut(&mut self) -> (&mut Array2<f32>, &mut Array2<f32>) {
        (&mut self.subject_factors, &mut self.object_factors)
    }
}

impl RatingModel for FactorModel {
    fn num_subjects(&self) -> usize {
        self.subject_factors.nrows()
    }

    fn num_objects(&self) -> usize {
        self.object_factors.nrows()
    }

    fn predict(&self, subject: SubjectIndex, object: ObjectIndex) -> Result<f32, PredictionError> {
        if subject >= self.num_subjects() {
            return Err(PredictionError::IndexOutOfRange {
                axis: Axis::Subject,
                index: subject,
                len: self.num_subjects(),
            });
        }
        if object >= self.num_objects() {
            return Err(PredictionError::IndexOutOfRange {
                axis: Axis::Object,
                index: object,
                len: self.num_objects(),
            });
        }

        let prediction = self.subject_factors
            .row(subject)
            .dot(&self.object_factors.row(object));

        if prediction.is_finite() {
            Ok(prediction)
        } else {
            Err(PredictionError::InvalidPredictionValue)
        }
    }
}

/// Fits factor models. Holds the random state, so a single trainer
/// runs one fit at a time.
#[derive(Debug)]
pub struct Trainer {
    hyper: Hyperparameters,
    rng: XorShiftRng,
}

impl Trainer {
    /// The hyperparameters the trainer was built from.
    pub fn hyperparameters(&self) -> &Hyperparameters {
        &self.hyper
    }

    /// Fit a fresh model to `interactions`, running exactly
    /// `num_iterations` passes.
    pub fn fit(&mut self, interactions: &EncodedRatings) -> Result<FactorModel, FittingError> {
        if interactions.is_empty() {
            return Err(FittingError::NoInteractions);
        }

        let mut model = FactorModel::random(
            interactions.num_subjects(),
            interactions.num_objects(),
            self.hyper.rank,
            &mut self.rng,
        );

        info!(
            num_ratings = interactions.len(),
            num_subjects = interactions.num_subjects(),
            num_objects = interactions.num_objects(),
            rank = self.hyper.rank,
            solver = ?self.hyper.solver,
            loss = ?self.hyper.loss,
            "Fitting factorization model"
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.hyper.num_threads)
            .build()
            .map_err(FittingError::ThreadPool)?;

        let sampler = match self.hyper.loss {
            Loss::OneClassSquared => Some(NegativeSampler::new(interactions)),
            Loss::SquaredError => None,
        };
        let sampler = sampler.as_ref();

        let mut loss = None;

        for iteration in 0..self.hyper.num_iterations {
            let (hyper, rng) = (&self.hyper, &mut self.rng);
            let value = match hyper.solver {
                Solver::GradientDescent => {
                    sgd::fit_pass(&mut model, interactions, hyper, sampler, rng)
                }
                Solver::AlternatingLeastSquares => pool.install(|| {
                    als::fit_pass(&mut model, interactions, hyper, sampler, rng)
                }),
            };

            debug!(iteration, loss = value, "Finished pass");
            loss = Some(value);
        }

        if let Some(loss) = loss {
            if !(loss.is_finite() && model.is_finite()) {
                warn!(loss, "Fitting diverged");
                return Err(FittingError::Diverged {
                    num_iterations: self.hyper.num_iterations,
                    loss,
                });
            }
            info!(loss, "Finished fitting");
        }

        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Rating, Ratings};
    use crate::encoding::IdEncoder;

    fn two_users() -> (IdEncoder, EncodedRatings) {
        let ratings = Ratings::from(vec![Rating::new(1, 10, 5.0), Rating::new(2, 10, 1.0)]);
        let mut encoder = IdEncoder::new();
        let encoded = encoder.encode_ratings(&ratings);

        (encoder, encoded)
    }

    fn closer_to(value: f32, target: f32, other: f32) -> bool {
        (value - target).abs() < (value - other).abs()
    }

    #[test]
    fn predict_is_dot_product() {
        let model = FactorModel::from_factors(
            Array2::from_shape_vec((2, 2), vec![1.0, 1.0, 2.0, 0.0]).unwrap(),
            Array2::from_shape_vec((2, 2), vec![0.5, 2.0, 3.0, 3.0]).unwrap(),
        ).unwrap();

        assert_eq!(model.predict(0, 0), Ok(2.5));
        assert_eq!(model.predict(1, 1), Ok(6.0));
        assert_eq!(model.predict(1, 1), model.predict(1, 1));
    }

    #[test]
    fn predict_out_of_range() {
        let model = FactorModel::random(2, 3, 4, &mut XorShiftRng::seed_from_u64(1));

        assert_eq!(
            model.predict(2, 0),
            Err(PredictionError::IndexOutOfRange {
                axis: Axis::Subject,
                index: 2,
                len: 2,
            })
        );
        assert_eq!(
            model.predict(0, 3),
            Err(PredictionError::IndexOutOfRange {
                axis: Axis::Object,
                index: 3,
                len: 3,
            })
        );
    }

    #[test]
    fn mismatched_ranks_are_rejected() {
        let result = FactorModel::from_factors(Array2::zeros((2, 3)), Array2::zeros((2, 4)));

        match result {
            Err(FittingError::InvalidConfig { .. }) => {}
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn invalid_hyperparameters() {
        let valid = Hyperparameters::new(2, 10, 0.1, 0.1, Loss::SquaredError);

        for hyper in vec![
            valid.clone().rank(0),
            valid.clone().l2_penalty(-0.1),
            valid.clone().l2_penalty(::std::f32::NAN),
            valid.clone().learning_rate(0.0),
            valid.clone().negative_weight(-1.0),
            valid.clone().num_threads(0),
        ] {
            match hyper.build() {
                Err(FittingError::InvalidConfig { .. }) => {}
                other => panic!("unexpected result {:?}", other),
            }
        }

        assert!(valid.build().is_ok());
    }

    #[test]
    fn no_interactions() {
        let mut trainer = Hyperparameters::new(2, 10, 0.1, 0.1, Loss::SquaredError)
            .build()
            .unwrap();

        match trainer.fit(&EncodedRatings::default()) {
            Err(FittingError::NoInteractions) => {}
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn zero_iterations_returns_initialization() {
        let (_, encoded) = two_users();

        for &solver in &[Solver::AlternatingLeastSquares, Solver::GradientDescent] {
            let model = Hyperparameters::new(3, 0, 0.1, 0.1, Loss::SquaredError)
                .solver(solver)
                .seed(99)
                .build()
                .unwrap()
                .fit(&encoded)
                .unwrap();

            let expected = FactorModel::random(2, 1, 3, &mut XorShiftRng::seed_from_u64(99));

            assert_eq!(model, expected);
        }
    }

    #[test]
    fn fit_is_reproducible() {
        let (_, encoded) = two_users();

        for &solver in &[Solver::AlternatingLeastSquares, Solver::GradientDescent] {
            let hyper = Hyperparameters::new(4, 10, 0.05, 0.05, Loss::SquaredError)
                .solver(solver)
                .seed(3);

            let first = hyper.clone().build().unwrap().fit(&encoded).unwrap();
            let second = hyper.num_threads(1).build().unwrap().fit(&encoded).unwrap();

            assert_eq!(first, second);
        }
    }

    #[test]
    fn als_separates_two_users() {
        let (encoder, encoded) = two_users();

        let model = Hyperparameters::new(2, 20, 0.025, 0.01, Loss::SquaredError)
            .seed(42)
            .build()
            .unwrap()
            .fit(&encoded)
            .unwrap();

        let item = encoder.index(Axis::Object, 10).unwrap();
        let first = model.predict(encoder.index(Axis::Subject, 1).unwrap(), item).unwrap();
        let second = model.predict(encoder.index(Axis::Subject, 2).unwrap(), item).unwrap();

        assert!(closer_to(first, 5.0, 1.0), "first user scored {}", first);
        assert!(closer_to(second, 1.0, 5.0), "second user scored {}", second);
    }

    #[test]
    fn sgd_separates_two_users() {
        let (encoder, encoded) = two_users();

        let model = Hyperparameters::new(2, 1000, 0.001, 0.05, Loss::SquaredError)
            .solver(Solver::GradientDescent)
            .seed(42)
            .build()
            .unwrap()
            .fit(&encoded)
            .unwrap();

        let item = encoder.index(Axis::Object, 10).unwrap();
        let first = model.predict(encoder.index(Axis::Subject, 1).unwrap(), item).unwrap();
        let second = model.predict(encoder.index(Axis::Subject, 2).unwrap(), item).unwrap();

        assert!((first - 5.0).abs() < 0.5, "first user scored {}", first);
        assert!((second - 1.0).abs() < 0.5, "second user scored {}", second);
    }

    #[test]
    fn diverging_fit_is_rejected() {
        let (_, encoded) = two_users();

        let result = Hyperparameters::new(2, 100, 0.0, 100.0, Loss::SquaredError)
            .solver(Solver::GradientDescent)
            .seed(42)
            .build()
            .unwrap()
            .fit(&encoded);

        match result {
            Err(FittingError::Diverged { num_iterations, .. }) => assert_eq!(num_iterations, 100),
            other => panic!("unexpected result {:?}", other),
        }
    }

    fn two_clusters() -> (IdEncoder, EncodedRatings) {
        let mut ratings = Vec::new();
        for subject in 0..10u64 {
            let cluster = subject / 5;
            for object in (cluster * 5)..(cluster * 5 + 5) {
                if object != subject {
                    ratings.push(Rating::implicit(subject, 100 + object));
                }
            }
        }

        let mut encoder = IdEncoder::new();
        let encoded = encoder.encode_ratings(&Ratings::from(ratings));

        (encoder, encoded)
    }

    #[test]
    fn one_class_ranks_co_purchases_first() {
        let (encoder, encoded) = two_clusters();

        for &solver in &[Solver::AlternatingLeastSquares, Solver::GradientDescent] {
            let model = Hyperparameters::new(2, 200, 0.025, 0.05, Loss::OneClassSquared)
                .solver(solver)
                .num_negatives(2)
                .seed(11)
                .build()
                .unwrap()
                .fit(&encoded)
                .unwrap();

            let score = |subject: u64, object: u64| {
                model
                    .predict(
                        encoder.index(Axis::Subject, subject).unwrap(),
                        encoder.index(Axis::Object, object).unwrap(),
                    )
                    .unwrap()
            };

            // Held-out pair inside the cluster against a pair across clusters.
            assert!(
                score(0, 100) > score(0, 107),
                "{:?}: {} <= {}",
                solver,
                score(0, 100),
                score(0, 107)
            );
            assert!(score(6, 106) > score(6, 101), "{:?}", solver);
        }
    }
}
