extern crate failure;
extern crate mfrec;
#[macro_use]
extern crate tracing;

use mfrec::config::{init_logging, RunConfig};
use mfrec::data::{Ratings, Schema};
use mfrec::encoding::IdEncoder;
use mfrec::evaluation::evaluate;
use mfrec::models::factorization::Hyperparameters;
use mfrec::models::Loss;
use mfrec::predictor::Predictor;

const TRAIN_FILE: &str = "recommendation-ratings-train.csv";
const TEST_FILE: &str = "recommendation-ratings-test.csv";

const USER_ID: u64 = 6;
const MOVIE_ID: u64 = 10;
const THRESHOLD: f32 = 3.5;

fn main() -> Result<(), failure::Error> {
    init_logging();
    let config = RunConfig::from_env()?;

    let schema = Schema::movie_ratings();
    let train = Ratings::from_path(config.data_dir.join(TRAIN_FILE), &schema)?;
    let test = Ratings::from_path(config.data_dir.join(TEST_FILE), &schema)?;

    let hyper = config.hyperparameters(Hyperparameters::new(
        100,
        20,
        0.1,
        0.1,
        Loss::SquaredError,
    ))?;

    let mut encoder = IdEncoder::new();
    let encoded = encoder.encode_ratings(&train);

    let model = hyper.build()?.fit(&encoded)?;
    let metrics = evaluate(&model, &encoder, &test)?;

    println!("Root Mean Squared Error: {:.2}", metrics.rmse);
    println!("RSquared: {:.2}", metrics.r_squared);

    let predictor = Predictor::new(encoder, model);

    match predictor.recommend(USER_ID, MOVIE_ID, THRESHOLD) {
        Ok(recommendation) => {
            let verdict = if recommendation.recommended {
                "is recommended"
            } else {
                "is not recommended"
            };
            println!(
                "For userId: {} movie rating prediction ({:.2}) for movieId: {} {}",
                USER_ID, recommendation.score, MOVIE_ID, verdict
            );
        }
        Err(error) => warn!(%error, "Cannot score the sample pair"),
    }

    if let Some(ref path) = config.model_path {
        predictor.save(path)?;
    }

    Ok(())
}
