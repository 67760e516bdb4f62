//! Rating store: loading, schemas and train/test splits.
use std::hash::Hasher;
use std::io::Read;
use std::path::Path;

use csv;
use rand::distributions::{Distribution, Uniform};
use rand::seq::SliceRandom;
use rand::Rng;

use siphasher::sip::SipHasher;

use super::{ObjectId, SubjectId};

/// Data loading error types.
#[derive(Debug, Fail)]
pub enum DataError {
    /// The input file cannot be opened or read.
    #[fail(display = "Cannot read {}: {}", path, error)]
    Io {
        /// Path of the input file.
        path: String,
        /// Underlying reader error.
        #[cause]
        error: csv::Error,
    },
    /// A row has the wrong number of columns or an unparsable field.
    #[fail(display = "Malformed input row at line {}: {}", line, reason)]
    MalformedInputRow {
        /// One-based line number of the row.
        line: u64,
        /// What is wrong with the row.
        reason: String,
    },
    /// The schema itself is inconsistent.
    #[fail(display = "Invalid schema: {}", reason)]
    InvalidSchema {
        /// What is wrong with the schema.
        reason: String,
    },
}

/// A single observed rating.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    subject_id: SubjectId,
    object_id: ObjectId,
    value: f32,
}

impl Rating {
    /// Build a new rating.
    pub fn new(subject_id: SubjectId, object_id: ObjectId, value: f32) -> Self {
        Rating {
            subject_id,
            object_id,
            value,
        }
    }

    /// Build a positive-only observation, labelled 1.0.
    pub fn implicit(subject_id: SubjectId, object_id: ObjectId) -> Self {
        Rating::new(subject_id, object_id, 1.0)
    }

    /// External subject id.
    pub fn subject_id(&self) -> SubjectId {
        self.subject_id
    }
    /// External object id.
    pub fn object_id(&self) -> ObjectId {
        self.object_id
    }
    /// Observed label.
    pub fn value(&self) -> f32 {
        self.value
    }
}

/// What a column feeds into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnRole {
    /// The subject id column.
    Subject,
    /// The object id column.
    Object,
    /// The rating label column.
    Label,
}

/// How a column's text is parsed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataKind {
    /// Unsigned integer.
    UInt,
    /// Floating point number.
    Float,
}

/// A column of a delimited text file, bound by position.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Name used in error messages.
    pub name: String,
    /// What the column feeds into.
    pub role: ColumnRole,
    /// How the column's text is parsed.
    pub kind: DataKind,
    /// Zero-based field position.
    pub position: usize,
}

impl Column {
    /// Build a new column descriptor.
    pub fn new(name: &str, role: ColumnRole, kind: DataKind, position: usize) -> Self {
        Column {
            name: name.to_owned(),
            role,
            kind,
            position,
        }
    }
}

/// Layout of a delimited ratings file.
///
/// Columns are bound by position, not by header name. A schema without a
/// label column yields positive-only ratings with an implicit label of 1.0.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    columns: Vec<Column>,
    separator: u8,
    has_header: bool,
    comment: Option<u8>,
}

impl Schema {
    /// Build an empty schema using `separator` between fields.
    pub fn new(separator: u8) -> Self {
        Schema {
            columns: Vec::new(),
            separator,
            has_header: false,
            comment: None,
        }
    }

    /// Comma separated `userId,movieId,Label` with a header row.
    pub fn movie_ratings() -> Self {
        Schema::new(b',')
            .has_header(true)
            .column(Column::new("userId", ColumnRole::Subject, DataKind::UInt, 0))
            .column(Column::new("movieId", ColumnRole::Object, DataKind::UInt, 1))
            .column(Column::new("Label", ColumnRole::Label, DataKind::Float, 2))
    }

    /// Tab separated product co-purchase pairs, `#` comment lines, no label.
    pub fn co_purchase() -> Self {
        Schema::new(b'\t')
            .comment(b'#')
            .column(Column::new(
                "ProductID",
                ColumnRole::Subject,
                DataKind::UInt,
                0,
            ))
            .column(Column::new(
                "CoPurchaseProductID",
                ColumnRole::Object,
                DataKind::UInt,
                1,
            ))
    }

    /// Set whether the first row is a header to skip.
    pub fn has_header(mut self, has_header: bool) -> Self {
        self.has_header = has_header;
        self
    }

    /// Skip lines starting with `comment`.
    pub fn comment(mut self, comment: u8) -> Self {
        self.comment = Some(comment);
        self
    }

    /// Append a column.
    pub fn column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    /// The columns, in declaration order.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Check the schema is usable for loading ratings.
    pub fn validate(&self) -> Result<(), DataError> {
        let invalid = |reason: String| -> Result<(), DataError> {
            Err(DataError::InvalidSchema { reason })
        };

        for &role in &[ColumnRole::Subject, ColumnRole::Object, ColumnRole::Label] {
            let count = self.columns.iter().filter(|c| c.role == role).count();

            if count > 1 {
                return invalid(format!("more than one {:?} column", role));
            }
            if count == 0 && role != ColumnRole::Label {
                return invalid(format!("missing {:?} column", role));
            }
        }

        for column in &self.columns {
            let expected = match column.role {
                ColumnRole::Subject | ColumnRole::Object => DataKind::UInt,
                ColumnRole::Label => DataKind::Float,
            };
            if column.kind != expected {
                return invalid(format!(
                    "column {} must be {:?}, not {:?}",
                    column.name, expected, column.kind
                ));
            }
            if self.columns
                .iter()
                .filter(|other| other.position == column.position)
                .count() > 1
            {
                return invalid(format!("position {} bound twice", column.position));
            }
        }

        Ok(())
    }

    fn reader_builder(&self) -> csv::ReaderBuilder {
        let mut builder = csv::ReaderBuilder::new();
        builder
            .delimiter(self.separator)
            .has_headers(self.has_header)
            .comment(self.comment)
            .flexible(true)
            .trim(csv::Trim::All);
        builder
    }

    fn parse_record(&self, record: &csv::StringRecord, line: u64) -> Result<Rating, DataError> {
        let malformed = |reason: String| DataError::MalformedInputRow { line, reason };

        let mut subject_id = None;
        let mut object_id = None;
        let mut value = 1.0;

        for column in &self.columns {
            let field = record.get(column.position).ok_or_else(|| {
                malformed(format!(
                    "expected at least {} columns, found {}",
                    column.position + 1,
                    record.len()
                ))
            })?;

            match column.kind {
                DataKind::UInt => {
                    let id = field.parse::<u64>().map_err(|_| {
                        malformed(format!("{} is not an unsigned integer: {:?}", column.name, field))
                    })?;
                    match column.role {
                        ColumnRole::Subject => subject_id = Some(id),
                        _ => object_id = Some(id),
                    }
                }
                DataKind::Float => {
                    let label = field
                        .parse::<f32>()
                        .ok()
                        .filter(|label| label.is_finite())
                        .ok_or_else(|| {
                            malformed(format!("{} is not a finite number: {:?}", column.name, field))
                        })?;
                    value = label;
                }
            }
        }

        match (subject_id, object_id) {
            (Some(subject_id), Some(object_id)) => Ok(Rating::new(subject_id, object_id, value)),
            _ => Err(malformed("missing id column".to_owned())),
        }
    }

    fn load<R: Read>(&self, mut reader: csv::Reader<R>, path: &str) -> Result<Ratings, DataError> {
        self.validate()?;

        let mut ratings = Vec::new();
        let mut record = csv::StringRecord::new();

        loop {
            let more = reader.read_record(&mut record).map_err(|error| DataError::Io {
                path: path.to_owned(),
                error,
            })?;
            if !more {
                break;
            }

            let line = record.position().map(|p| p.line()).unwrap_or(0);
            ratings.push(self.parse_record(&record, line)?);
        }

        Ok(Ratings::from(ratings))
    }
}

/// An immutable batch of observed ratings.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Ratings {
    ratings: Vec<Rating>,
}

impl Ratings {
    /// Load ratings from a delimited text file.
    pub fn from_path<P: AsRef<Path>>(path: P, schema: &Schema) -> Result<Self, DataError> {
        let path = path.as_ref();
        let shown = path.display().to_string();

        let reader = schema
            .reader_builder()
            .from_path(path)
            .map_err(|error| DataError::Io {
                path: shown.clone(),
                error,
            })?;

        let ratings = schema.load(reader, &shown)?;
        info!(path = %shown, num_ratings = ratings.len(), "Loaded ratings");

        Ok(ratings)
    }

    /// Load ratings from any reader, e.g. an in-memory buffer.
    pub fn from_reader<R: Read>(reader: R, schema: &Schema) -> Result<Self, DataError> {
        schema.load(schema.reader_builder().from_reader(reader), "<reader>")
    }

    /// The ratings, in load order.
    pub fn data(&self) -> &[Rating] {
        &self.ratings
    }

    /// Number of ratings.
    pub fn len(&self) -> usize {
        self.ratings.len()
    }

    /// Whether there are no ratings.
    pub fn is_empty(&self) -> bool {
        self.ratings.is_empty()
    }

    fn shuffled<R: Rng>(&self, rng: &mut R) -> Ratings {
        let mut ratings = self.ratings.clone();
        ratings.shuffle(rng);

        Ratings { ratings }
    }

    /// Split into the first `idx` ratings and the rest.
    pub fn split_at(&self, idx: usize) -> (Self, Self) {
        let idx = idx.min(self.len());
        let head = Ratings {
            ratings: self.ratings[..idx].to_owned(),
        };
        let tail = Ratings {
            ratings: self.ratings[idx..].to_owned(),
        };

        (head, tail)
    }

    /// Split into ratings matching `func` and the rest.
    pub fn split_by<F: Fn(&Rating) -> bool>(&self, func: F) -> (Self, Self) {
        let (head, tail) = self.ratings.iter().partition(|x| func(x));

        (Ratings { ratings: head }, Ratings { ratings: tail })
    }
}

impl From<Vec<Rating>> for Ratings {
    fn from(ratings: Vec<Rating>) -> Ratings {
        Ratings { ratings }
    }
}

/// Randomly split ratings into `(train, test)`, with roughly
/// `test_fraction` of them in the test set.
pub fn train_test_split<R: Rng>(
    ratings: &Ratings,
    rng: &mut R,
    test_fraction: f32,
) -> (Ratings, Ratings) {
    let shuffled = ratings.shuffled(rng);
    let (test, train) = shuffled.split_at((test_fraction * ratings.len() as f32) as usize);

    (train, test)
}

/// Split ratings into `(train, test)` so that all the ratings of a
/// subject end up on the same side.
pub fn subject_based_split<R: Rng>(
    ratings: &Ratings,
    rng: &mut R,
    test_fraction: f32,
) -> (Ratings, Ratings) {
    let denominator = 100_000;
    let train_cutoff = (test_fraction * denominator as f32) as u64;

    let range = Uniform::new_inclusive(0, u64::max_value());
    let (key_0, key_1) = (range.sample(rng), range.sample(rng));

    let is_train = |x: &Rating| {
        let mut hasher = SipHasher::new_with_keys(key_0, key_1);
        hasher.write_u64(x.subject_id());
        hasher.finish() % denominator >= train_cutoff
    };

    ratings.split_by(is_train)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::fs::File;
    use std::io::Write;

    use rand::SeedableRng;
    use rand_xorshift::XorShiftRng;

    use super::*;

    const MOVIES: &str = "userId,movieId,Label\n1,10,5.0\n1,20,3.5\n2,10,1.0\n";

    #[test]
    fn load_movie_ratings() {
        let ratings = Ratings::from_reader(MOVIES.as_bytes(), &Schema::movie_ratings()).unwrap();

        assert_eq!(
            ratings.data(),
            &[
                Rating::new(1, 10, 5.0),
                Rating::new(1, 20, 3.5),
                Rating::new(2, 10, 1.0),
            ]
        );
    }

    #[test]
    fn load_co_purchase_skips_comments_and_defaults_label() {
        let text = "# Directed graph\n# FromNodeId\tToNodeId\n0\t1\n0\t2\n3\t63\n";
        let ratings = Ratings::from_reader(text.as_bytes(), &Schema::co_purchase()).unwrap();

        assert_eq!(ratings.len(), 3);
        assert!(ratings.data().iter().all(|r| r.value() == 1.0));
        assert_eq!(ratings.data()[2], Rating::implicit(3, 63));
    }

    #[test]
    fn short_row_is_malformed() {
        let text = "userId,movieId,Label\n1,10,5.0\n2,10\n";
        let error = Ratings::from_reader(text.as_bytes(), &Schema::movie_ratings()).unwrap_err();

        match error {
            DataError::MalformedInputRow { line, .. } => assert_eq!(line, 3),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn unparsable_fields_are_malformed() {
        for text in &[
            "userId,movieId,Label\n-1,10,5.0\n",
            "userId,movieId,Label\n1,ten,5.0\n",
            "userId,movieId,Label\n1,10,NaN\n",
        ] {
            let result = Ratings::from_reader(text.as_bytes(), &Schema::movie_ratings());
            match result {
                Err(DataError::MalformedInputRow { .. }) => {}
                other => panic!("{:?} loaded as {:?}", text, other),
            }
        }
    }

    #[test]
    fn invalid_schemas_are_rejected() {
        let missing_object = Schema::new(b',')
            .column(Column::new("a", ColumnRole::Subject, DataKind::UInt, 0));
        let float_id = Schema::new(b',')
            .column(Column::new("a", ColumnRole::Subject, DataKind::Float, 0))
            .column(Column::new("b", ColumnRole::Object, DataKind::UInt, 1));
        let shared_position = Schema::new(b',')
            .column(Column::new("a", ColumnRole::Subject, DataKind::UInt, 0))
            .column(Column::new("b", ColumnRole::Object, DataKind::UInt, 0));

        for schema in &[missing_object, float_id, shared_position] {
            match schema.validate() {
                Err(DataError::InvalidSchema { .. }) => {}
                other => panic!("{:?} validated as {:?}", schema, other),
            }
        }

        assert!(Schema::movie_ratings().validate().is_ok());
        assert!(Schema::co_purchase().validate().is_ok());
    }

    #[test]
    fn load_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ratings.csv");
        File::create(&path)
            .unwrap()
            .write_all(MOVIES.as_bytes())
            .unwrap();

        let ratings = Ratings::from_path(&path, &Schema::movie_ratings()).unwrap();
        assert_eq!(ratings.len(), 3);

        match Ratings::from_path(dir.path().join("missing.csv"), &Schema::movie_ratings()) {
            Err(DataError::Io { path, .. }) => assert!(path.ends_with("missing.csv")),
            other => panic!("unexpected result {:?}", other),
        }
    }

    fn synthetic(num_subjects: u64, per_subject: u64) -> Ratings {
        let mut ratings = Vec::new();
        for subject in 0..num_subjects {
            for object in 0..per_subject {
                ratings.push(Rating::new(subject, object, (subject % 5) as f32));
            }
        }
        Ratings::from(ratings)
    }

    #[test]
    fn random_split_keeps_every_rating() {
        let ratings = synthetic(20, 10);
        let mut rng = XorShiftRng::seed_from_u64(42);

        let (train, test) = train_test_split(&ratings, &mut rng, 0.2);

        assert_eq!(test.len(), 40);
        assert_eq!(train.len(), 160);
    }

    #[test]
    fn subject_split_is_disjoint_on_subjects() {
        let ratings = synthetic(200, 5);
        let mut rng = XorShiftRng::seed_from_u64(42);

        let (train, test) = subject_based_split(&ratings, &mut rng, 0.2);

        let train_subjects: HashSet<_> = train.data().iter().map(|r| r.subject_id()).collect();
        let test_subjects: HashSet<_> = test.data().iter().map(|r| r.subject_id()).collect();

        assert_eq!(train.len() + test.len(), ratings.len());
        assert!(train_subjects.is_disjoint(&test_subjects));
        assert!(!test.is_empty());
        assert!(train.len() > test.len());
    }
}
