//! Regression metrics of a rating model over held-out ratings.
use rayon::prelude::*;

use super::data::Ratings;
use super::encoding::IdEncoder;
use super::{Axis, PredictionError, RatingModel};

/// Evaluation error types.
#[derive(Debug, Fail, PartialEq)]
pub enum EvaluationError {
    /// No test rating could be scored.
    #[fail(display = "No test rating has ids known to the model.")]
    EmptyTestSet,
    /// Scoring an encoded pair failed.
    #[fail(display = "Prediction failed: {}", _0)]
    Prediction(#[cause] PredictionError),
}

impl From<PredictionError> for EvaluationError {
    fn from(error: PredictionError) -> Self {
        EvaluationError::Prediction(error)
    }
}

/// Accuracy of predicted ratings against observed ones.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    /// Square root of the mean squared error.
    pub rmse: f64,
    /// Coefficient of determination.
    pub r_squared: f64,
    /// Mean absolute error.
    pub mean_absolute_error: f64,
    /// Mean squared error.
    pub mean_squared_error: f64,
    /// Number of ratings that were scored.
    pub num_scored: usize,
    /// Number of ratings skipped because an id is unknown to the encoder.
    pub num_skipped: usize,
}

impl Metrics {
    fn from_predictions(scored: &[(f32, f32)], num_skipped: usize) -> Result<Self, EvaluationError> {
        if scored.is_empty() {
            return Err(EvaluationError::EmptyTestSet);
        }

        let n = scored.len() as f64;
        let mean_label = scored.iter().map(|&(_, label)| f64::from(label)).sum::<f64>() / n;

        let (mut ss_residual, mut ss_total, mut absolute) = (0.0, 0.0, 0.0);
        for &(prediction, label) in scored {
            let residual = f64::from(label) - f64::from(prediction);
            ss_residual += residual * residual;
            absolute += residual.abs();
            ss_total += (f64::from(label) - mean_label).powi(2);
        }

        // Constant labels leave R² undefined: count exact fits as perfect.
        let r_squared = if ss_total > 0.0 {
            1.0 - ss_residual / ss_total
        } else if ss_residual == 0.0 {
            1.0
        } else {
            0.0
        };

        let mean_squared_error = ss_residual / n;

        Ok(Metrics {
            rmse: mean_squared_error.sqrt(),
            r_squared,
            mean_absolute_error: absolute / n,
            mean_squared_error,
            num_scored: scored.len(),
            num_skipped,
        })
    }
}

/// Score every test rating whose ids are both known to `encoder`
/// and compute regression metrics. Ratings with unknown ids are
/// skipped and counted in [`Metrics::num_skipped`].
pub fn evaluate<T: RatingModel + Sync>(
    model: &T,
    encoder: &IdEncoder,
    test: &Ratings,
) -> Result<Metrics, EvaluationError> {
    let scored: Vec<(f32, f32)> = test.data()
        .par_iter()
        .filter_map(|rating| {
            let subject = encoder.index(Axis::Subject, rating.subject_id()).ok()?;
            let object = encoder.index(Axis::Object, rating.object_id()).ok()?;

            Some((subject, object, rating.value()))
        })
        .map(|(subject, object, label)| {
            model
                .predict(subject, object)
                .map(|prediction| (prediction, label))
        })
        .collect::<Result<_, PredictionError>>()?;

    let num_skipped = test.len() - scored.len();
    if num_skipped > 0 {
        debug!(num_skipped, "Skipped test ratings with unknown ids");
    }

    Metrics::from_predictions(&scored, num_skipped)
}
