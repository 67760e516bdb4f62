//! Single-pair predictions from a fitted model, and model persistence.
use std::cmp::Ordering;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde_json;

use super::encoding::IdEncoder;
use super::models::factorization::FactorModel;
use super::{Axis, ObjectId, PredictionError, RatingModel, SubjectId};

/// Persistence error types.
#[derive(Debug, Fail)]
pub enum PersistenceError {
    /// The artifact file cannot be created, opened or written.
    #[fail(display = "Cannot access model file {}: {}", path, error)]
    Io {
        /// Path of the artifact.
        path: String,
        /// Underlying I/O error.
        #[cause]
        error: ::std::io::Error,
    },
    /// The artifact cannot be encoded or decoded.
    #[fail(display = "Invalid model file {}: {}", path, error)]
    Format {
        /// Path of the artifact.
        path: String,
        /// Underlying serialization error.
        #[cause]
        error: serde_json::Error,
    },
}

/// Score `object_id` for `subject_id` with a model fitted on ids encoded
/// by `encoder`.
pub fn predict_single<T: RatingModel>(
    model: &T,
    encoder: &IdEncoder,
    subject_id: SubjectId,
    object_id: ObjectId,
) -> Result<f32, PredictionError> {
    let subject = encoder.index(Axis::Subject, subject_id)?;
    let object = encoder.index(Axis::Object, object_id)?;

    model.predict(subject, object)
}

/// A score together with the decision taken against a threshold.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    /// The predicted score.
    pub score: f32,
    /// Whether the score exceeds the threshold.
    pub recommended: bool,
}

/// A fitted model bundled with the encoder used to train it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Predictor {
    encoder: IdEncoder,
    model: FactorModel,
}

impl Predictor {
    /// Bundle a model with its encoder.
    pub fn new(encoder: IdEncoder, model: FactorModel) -> Self {
        Predictor { encoder, model }
    }

    /// The id encoder.
    pub fn encoder(&self) -> &IdEncoder {
        &self.encoder
    }

    /// The factor model.
    pub fn model(&self) -> &FactorModel {
        &self.model
    }

    /// Score a single (subject, object) pair by external ids.
    pub fn predict(&self, subject_id: SubjectId, object_id: ObjectId) -> Result<f32, PredictionError> {
        predict_single(&self.model, &self.encoder, subject_id, object_id)
    }

    /// Score a pair and recommend it if the score is above `threshold`.
    pub fn recommend(
        &self,
        subject_id: SubjectId,
        object_id: ObjectId,
        threshold: f32,
    ) -> Result<Recommendation, PredictionError> {
        let score = self.predict(subject_id, object_id)?;

        Ok(Recommendation {
            score,
            recommended: score > threshold,
        })
    }

    /// The `k` best scoring objects for a subject, best first.
    pub fn top_k(&self, subject_id: SubjectId, k: usize) -> Result<Vec<(ObjectId, f32)>, PredictionError> {
        let subject = self.encoder.index(Axis::Subject, subject_id)?;

        let mut scores = Vec::with_capacity(self.model.num_objects());
        for object in 0..self.model.num_objects() {
            if let Some(object_id) = self.encoder.decode(Axis::Object, object) {
                scores.push((object_id, self.model.predict(subject, object)?));
            }
        }

        scores.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        scores.truncate(k);

        Ok(scores)
    }

    /// Write the predictor to `path` as JSON.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), PersistenceError> {
        let path = path.as_ref().display().to_string();

        let file = File::create(&path).map_err(|error| PersistenceError::Io {
            path: path.clone(),
            error,
        })?;

        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, self).map_err(|error| PersistenceError::Format {
            path: path.clone(),
            error,
        })?;
        writer.flush().map_err(|error| PersistenceError::Io {
            path: path.clone(),
            error,
        })?;

        info!(path = %path, "Saved model");

        Ok(())
    }

    /// Read a predictor written by [`Predictor::save`].
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, PersistenceError> {
        let path = path.as_ref().display().to_string();

        let file = File::open(&path).map_err(|error| PersistenceError::Io {
            path: path.clone(),
            error,
        })?;

        serde_json::from_reader(BufReader::new(file))
            .map_err(|error| PersistenceError::Format { path, error })
    }
}
