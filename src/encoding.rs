//! Mapping of sparse external ids to dense zero-based indices.
//!
//! Subjects and objects are encoded independently: the same external id
//! can appear on both axes and gets unrelated indices.
use std::collections::HashMap;

use super::data::Ratings;
use super::{Axis, ObjectIndex, PredictionError, SubjectIndex};

/// Index space of a single axis.
///
/// Only the ordered id list is serialized; the lookup map is rebuilt on load.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(from = "Vec<u64>", into = "Vec<u64>")]
struct AxisEncoder {
    indices: HashMap<u64, usize>,
    ids: Vec<u64>,
}

impl AxisEncoder {
    fn encode(&mut self, id: u64) -> usize {
        let ids = &mut self.ids;
        *self.indices.entry(id).or_insert_with(|| {
            ids.push(id);
            ids.len() - 1
        })
    }

    fn index(&self, id: u64) -> Option<usize> {
        self.indices.get(&id).cloned()
    }

    fn len(&self) -> usize {
        self.ids.len()
    }
}

impl From<Vec<u64>> for AxisEncoder {
    fn from(ids: Vec<u64>) -> Self {
        let mut encoder = AxisEncoder::default();
        for id in ids {
            encoder.encode(id);
        }
        encoder
    }
}

impl From<AxisEncoder> for Vec<u64> {
    fn from(encoder: AxisEncoder) -> Self {
        encoder.ids
    }
}

/// Encoder for both axes of a rating matrix.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct IdEncoder {
    subjects: AxisEncoder,
    objects: AxisEncoder,
}

impl IdEncoder {
    /// Build an empty encoder.
    pub fn new() -> Self {
        IdEncoder::default()
    }

    fn axis(&self, axis: Axis) -> &AxisEncoder {
        match axis {
            Axis::Subject => &self.subjects,
            Axis::Object => &self.objects,
        }
    }

    /// Return the index of `id` on `axis`, assigning the next free
    /// index if the id has not been seen before.
    pub fn encode(&mut self, axis: Axis, id: u64) -> usize {
        match axis {
            Axis::Subject => self.subjects.encode(id),
            Axis::Object => self.objects.encode(id),
        }
    }

    /// Look up the index of an already encoded id.
    pub fn index(&self, axis: Axis, id: u64) -> Result<usize, PredictionError> {
        self.axis(axis)
            .index(id)
            .ok_or(PredictionError::UnknownId { axis, id })
    }

    /// Map an index back to its external id.
    pub fn decode(&self, axis: Axis, index: usize) -> Option<u64> {
        self.axis(axis).ids.get(index).cloned()
    }

    /// Number of distinct ids encoded on `axis`.
    pub fn len(&self, axis: Axis) -> usize {
        self.axis(axis).len()
    }

    /// Whether nothing has been encoded yet.
    pub fn is_empty(&self) -> bool {
        self.subjects.len() == 0 && self.objects.len() == 0
    }

    /// Encode every rating, assigning indices to unseen ids.
    pub fn encode_ratings(&mut self, ratings: &Ratings) -> EncodedRatings {
        let mut subject_indices = Vec::with_capacity(ratings.len());
        let mut object_indices = Vec::with_capacity(ratings.len());
        let mut values = Vec::with_capacity(ratings.len());

        for rating in ratings.data() {
            subject_indices.push(self.encode(Axis::Subject, rating.subject_id()));
            object_indices.push(self.encode(Axis::Object, rating.object_id()));
            values.push(rating.value());
        }

        EncodedRatings {
            num_subjects: self.len(Axis::Subject),
            num_objects: self.len(Axis::Object),
            subject_indices,
            object_indices,
            values,
        }
    }
}

/// Ratings with both ids replaced by dense indices, stored column-wise.
#[derive(Clone, Debug, Default)]
pub struct EncodedRatings {
    num_subjects: usize,
    num_objects: usize,
    subject_indices: Vec<SubjectIndex>,
    object_indices: Vec<ObjectIndex>,
    values: Vec<f32>,
}

impl EncodedRatings {
    /// Number of ratings.
    pub fn len(&self) -> usize {
        self.values.len()
    }
    /// Whether there are no ratings.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
    /// Number of subject rows.
    pub fn num_subjects(&self) -> usize {
        self.num_subjects
    }
    /// Number of object rows.
    pub fn num_objects(&self) -> usize {
        self.num_objects
    }
    /// Subject index of every rating.
    pub fn subject_indices(&self) -> &[SubjectIndex] {
        &self.subject_indices
    }
    /// Object index of every rating.
    pub fn object_indices(&self) -> &[ObjectIndex] {
        &self.object_indices
    }
    /// Label of every rating.
    pub fn values(&self) -> &[f32] {
        &self.values
    }
    /// Iterate over `(subject, object, value)` triplets.
    pub fn iter<'a>(&'a self) -> impl Iterator<Item = (SubjectIndex, ObjectIndex, f32)> + 'a {
        izip!(
            self.subject_indices.iter().cloned(),
            self.object_indices.iter().cloned(),
            self.values.iter().cloned()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Rating;

    #[test]
    fn encoding_is_idempotent_and_dense() {
        let mut encoder = IdEncoder::new();

        assert_eq!(encoder.encode(Axis::Subject, 42), 0);
        assert_eq!(encoder.encode(Axis::Subject, 7), 1);
        assert_eq!(encoder.encode(Axis::Subject, 42), 0);
        assert_eq!(encoder.encode(Axis::Subject, 1000), 2);

        assert_eq!(encoder.len(Axis::Subject), 3);
        assert_eq!(encoder.index(Axis::Subject, 7), Ok(1));
        assert_eq!(encoder.decode(Axis::Subject, 2), Some(1000));
        assert_eq!(encoder.decode(Axis::Subject, 3), None);
    }

    #[test]
    fn axes_are_independent() {
        let mut encoder = IdEncoder::new();

        assert_eq!(encoder.encode(Axis::Subject, 5), 0);
        assert_eq!(encoder.encode(Axis::Object, 9), 0);
        assert_eq!(encoder.encode(Axis::Object, 5), 1);
        assert_eq!(encoder.encode(Axis::Subject, 9), 1);

        assert_eq!(encoder.index(Axis::Subject, 5), Ok(0));
        assert_eq!(encoder.index(Axis::Object, 5), Ok(1));
    }

    #[test]
    fn unknown_id() {
        let mut encoder = IdEncoder::new();
        encoder.encode(Axis::Subject, 1);

        assert_eq!(
            encoder.index(Axis::Subject, 999),
            Err(PredictionError::UnknownId {
                axis: Axis::Subject,
                id: 999,
            })
        );
        assert_eq!(
            encoder.index(Axis::Object, 1),
            Err(PredictionError::UnknownId {
                axis: Axis::Object,
                id: 1,
            })
        );
    }

    #[test]
    fn encode_ratings() {
        let ratings = Ratings::from(vec![
            Rating::new(100, 7, 4.0),
            Rating::new(200, 7, 2.0),
            Rating::new(100, 3, 1.0),
        ]);
        let mut encoder = IdEncoder::new();
        let encoded = encoder.encode_ratings(&ratings);

        assert_eq!(encoded.num_subjects(), 2);
        assert_eq!(encoded.num_objects(), 2);
        assert_eq!(
            encoded.iter().collect::<Vec<_>>(),
            vec![(0, 0, 4.0), (1, 0, 2.0), (0, 1, 1.0)]
        );
    }

    #[test]
    fn serialization_rebuilds_lookup() {
        let mut encoder = IdEncoder::new();
        for &id in &[30, 10, 20] {
            encoder.encode(Axis::Object, id);
        }

        let json = serde_json::to_string(&encoder).unwrap();
        let restored: IdEncoder = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.index(Axis::Object, 10), Ok(1));
        assert_eq!(restored.decode(Axis::Object, 2), Some(20));
        assert_eq!(restored.len(Axis::Subject), 0);
    }
}
