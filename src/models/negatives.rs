use std::collections::HashSet;

use rand::distributions::{Distribution, Uniform};
use rand::Rng;

use super::super::{ObjectIndex, SubjectIndex};
use crate::encoding::EncodedRatings;

const MAX_DRAWS: usize = 5;

/// Uniform sampler of objects a subject has not interacted with.
pub struct NegativeSampler {
    observed: HashSet<(SubjectIndex, ObjectIndex)>,
    object_range: Uniform<usize>,
}

impl NegativeSampler {
    pub fn new(interactions: &EncodedRatings) -> Self {
        NegativeSampler {
            observed: izip!(interactions.subject_indices(), interactions.object_indices())
                .map(|(&subject, &object)| (subject, object))
                .collect(),
            object_range: Uniform::new(0, interactions.num_objects().max(1)),
        }
    }

    /// Draw an object for `subject`, retrying a few times when the draw
    /// hits an observed pair. Dense subjects may still get an observed one.
    pub fn sample<R: Rng>(&self, subject: SubjectIndex, rng: &mut R) -> ObjectIndex {
        let mut object = 0;

        for _ in 0..MAX_DRAWS {
            object = self.object_range.sample(rng);

            if !self.observed.contains(&(subject, object)) {
                break;
            }
        }

        object
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_xorshift::XorShiftRng;

    use super::*;
    use crate::data::{Rating, Ratings};
    use crate::encoding::IdEncoder;

    #[test]
    fn avoids_observed_pairs() {
        let mut ratings = Vec::new();
        for object in 0..50 {
            ratings.push(Rating::implicit(0, object));
            ratings.push(Rating::implicit(1, object));
        }
        // Subject 0 has seen all but the last object.
        let ratings: Vec<_> = ratings
            .into_iter()
            .filter(|r| !(r.subject_id() == 0 && r.object_id() == 49))
            .collect();

        let mut encoder = IdEncoder::new();
        let encoded = encoder.encode_ratings(&Ratings::from(ratings));
        let sampler = NegativeSampler::new(&encoded);
        let mut rng = XorShiftRng::seed_from_u64(7);

        let draws: Vec<_> = (0..200).map(|_| sampler.sample(0, &mut rng)).collect();
        let unobserved = draws.iter().filter(|&&object| object == 49).count();

        assert!(draws.iter().all(|&object| object < 50));
        // One in 50 per draw, five draws: roughly 10% of samples.
        assert!(unobserved > 5);
    }
}
