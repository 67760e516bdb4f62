#![warn(missing_docs)]
//! # mfrec
//!
//! `mfrec` implements latent-factor rating prediction: observed
//! (subject, object, rating) triples are factorized into two low-rank
//! matrices whose inner products predict unobserved ratings. It covers
//! explicit ratings (users rating movies) as well as positive-only
//! signals (products bought together).
//!
//! ## Example
//! Fit a model on a handful of ratings and score a pair:
//!
//! ```rust
//! # extern crate mfrec;
//! use mfrec::data::{Rating, Ratings};
//! use mfrec::encoding::IdEncoder;
//! use mfrec::models::factorization::Hyperparameters;
//! use mfrec::models::Loss;
//! use mfrec::predictor::Predictor;
//!
//! let ratings = Ratings::from(vec![
//!     Rating::new(1, 10, 5.0),
//!     Rating::new(2, 10, 1.0),
//! ]);
//!
//! let mut encoder = IdEncoder::new();
//! let train = encoder.encode_ratings(&ratings);
//!
//! let mut trainer = Hyperparameters::new(2, 20, 0.025, 0.01, Loss::SquaredError)
//!     .seed(42)
//!     .build()
//!     .unwrap();
//! let model = trainer.fit(&train).unwrap();
//!
//! let predictor = Predictor::new(encoder, model);
//! let recommendation = predictor.recommend(1, 10, 3.5).unwrap();
//!
//! assert!(recommendation.recommended);
//! ```
#[macro_use]
extern crate serde_derive;

#[macro_use]
extern crate itertools;

#[macro_use]
extern crate failure;
#[macro_use]
extern crate tracing;

extern crate csv;
extern crate ndarray;
extern crate rand;
extern crate rand_xorshift;
extern crate rayon;
extern crate serde;
extern crate serde_json;
extern crate siphasher;
extern crate tracing_subscriber;

pub mod config;
pub mod data;
pub mod encoding;
pub mod evaluation;
pub mod models;
pub mod predictor;

use std::fmt;

/// External (sparse) identifier of a subject, e.g. a user or a product.
pub type SubjectId = u64;
/// External (sparse) identifier of an object, e.g. a movie or a co-purchased product.
pub type ObjectId = u64;
/// Dense zero-based index of an encoded subject.
pub type SubjectIndex = usize;
/// Dense zero-based index of an encoded object.
pub type ObjectIndex = usize;

/// The two independently encoded id spaces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    /// Rows of the rating matrix (users, products).
    Subject,
    /// Columns of the rating matrix (movies, co-purchased products).
    Object,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Axis::Subject => write!(f, "subject"),
            Axis::Object => write!(f, "object"),
        }
    }
}

/// Prediction error types.
#[derive(Debug, Fail, PartialEq)]
pub enum PredictionError {
    /// The external id was never seen while training.
    #[fail(display = "Unknown {} id {}.", axis, id)]
    UnknownId {
        /// Axis the lookup was made on.
        axis: Axis,
        /// The offending external id.
        id: u64,
    },
    /// An encoded index does not address a row of the factor matrices.
    #[fail(display = "{} index {} out of range for {} rows.", axis, index, len)]
    IndexOutOfRange {
        /// Axis of the offending index.
        axis: Axis,
        /// The offending index.
        index: usize,
        /// Number of rows on that axis.
        len: usize,
    },
    /// Failed prediction due to numerical issues.
    #[fail(display = "Invalid prediction value: non-finite or not a number.")]
    InvalidPredictionValue,
}

/// Fitting error types.
#[derive(Debug, Fail)]
pub enum FittingError {
    /// Hyperparameters or factor shapes are unusable.
    #[fail(display = "Invalid configuration: {}", reason)]
    InvalidConfig {
        /// What is wrong with the configuration.
        reason: String,
    },
    /// No interactions were given.
    #[fail(display = "No interactions to fit the model on.")]
    NoInteractions,
    /// Training produced non-finite factors or loss.
    #[fail(display = "Model diverged after {} passes (loss {}).", num_iterations, loss)]
    Diverged {
        /// Number of passes run.
        num_iterations: usize,
        /// Loss of the last pass.
        loss: f32,
    },
    /// The training thread pool could not be started.
    #[fail(display = "Cannot start training threads: {}", _0)]
    ThreadPool(#[cause] rayon::ThreadPoolBuildError),
}

/// Trait describing models that score encoded (subject, object) pairs.
pub trait RatingModel {
    /// Number of subject rows the model can score.
    fn num_subjects(&self) -> usize;
    /// Number of object rows the model can score.
    fn num_objects(&self) -> usize;
    /// Predict the rating of `object` by `subject`.
    fn predict(&self, subject: SubjectIndex, object: ObjectIndex) -> Result<f32, PredictionError>;
}
