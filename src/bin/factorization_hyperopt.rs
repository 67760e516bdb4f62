#[macro_use]
extern crate failure;
extern crate mfrec;
extern crate rand;
extern crate serde;
extern crate serde_json;
#[macro_use]
extern crate serde_derive;
#[macro_use]
extern crate tracing;

#[cfg(test)]
extern crate tempfile;

use std::cmp::Ordering;
use std::fs::File;
use std::io::{BufReader, ErrorKind};
use std::path::Path;
use std::time::{Duration, Instant};

use mfrec::config::{init_logging, RunConfig};
use mfrec::data::{Ratings, Schema};
use mfrec::encoding::{EncodedRatings, IdEncoder};
use mfrec::evaluation::{evaluate, EvaluationError, Metrics};
use mfrec::models::factorization::Hyperparameters;
use mfrec::FittingError;

const RESULTS_FILE: &str = "factorization_results.json";

#[derive(Debug, Serialize, Deserialize)]
struct Result {
    test_rmse: f64,
    train_rmse: f64,
    test_metrics: Metrics,
    elapsed: Duration,
    hyperparameters: Hyperparameters,
}

/// Previous results, or none if the file does not exist yet. A file that
/// cannot be parsed is an error, so it never gets overwritten.
fn load_results(path: &Path) -> ::std::result::Result<Vec<Result>, failure::Error> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(ref error) if error.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(error) => return Err(error.into()),
    };

    serde_json::from_reader(BufReader::new(file)).map_err(|error| {
        format_err!("Cannot parse previous results in {}: {}", path.display(), error)
    })
}

/// Fit and score one set of hyperparameters. Diverged trials give `None`.
fn run_trial(
    hyper: Hyperparameters,
    encoder: &IdEncoder,
    encoded: &EncodedRatings,
    train: &Ratings,
    test: &Ratings,
) -> ::std::result::Result<Option<Result>, failure::Error> {
    let start = Instant::now();
    let model = match hyper.clone().build()?.fit(encoded) {
        Ok(model) => model,
        Err(error @ FittingError::Diverged { .. }) => {
            warn!(%error, "Skipping trial");
            return Ok(None);
        }
        Err(error) => return Err(error.into()),
    };
    let elapsed = start.elapsed();

    let scores = evaluate(&model, encoder, test).and_then(|test_metrics| {
        evaluate(&model, encoder, train).map(|train_metrics| (test_metrics, train_metrics))
    });

    let (test_metrics, train_metrics) = match scores {
        Ok(scores) => scores,
        Err(error @ EvaluationError::Prediction(_)) => {
            warn!(%error, "Skipping trial");
            return Ok(None);
        }
        Err(error) => return Err(error.into()),
    };

    if !test_metrics.rmse.is_finite() {
        warn!(rmse = test_metrics.rmse, "Skipping trial");
        return Ok(None);
    }

    Ok(Some(Result {
        test_rmse: test_metrics.rmse,
        train_rmse: train_metrics.rmse,
        test_metrics,
        elapsed,
        hyperparameters: hyper,
    }))
}

fn main() -> ::std::result::Result<(), failure::Error> {
    init_logging();
    let config = RunConfig::from_env()?;

    let schema = Schema::movie_ratings();
    let train = Ratings::from_path(config.data_dir.join("recommendation-ratings-train.csv"), &schema)?;
    let test = Ratings::from_path(config.data_dir.join("recommendation-ratings-test.csv"), &schema)?;

    let mut encoder = IdEncoder::new();
    let encoded = encoder.encode_ratings(&train);

    let mut rng = rand::thread_rng();
    let results_path = Path::new(RESULTS_FILE);

    for trial in 0..config.num_trials {
        let mut results = load_results(results_path)?;

        let hyper = Hyperparameters::random(&mut rng);
        info!(trial, hyperparameters = ?hyper, "Running trial");

        let result = match run_trial(hyper, &encoder, &encoded, &train, &test)? {
            Some(result) => result,
            None => continue,
        };

        println!("{:#?}", result);

        results.push(result);
        // Worst first, so the best result is last.
        results.sort_by(|a, b| {
            b.test_rmse
                .partial_cmp(&a.test_rmse)
                .unwrap_or(Ordering::Equal)
        });

        println!("Best result: {:#?}", results.last());

        let file = File::create(results_path)?;
        serde_json::to_writer_pretty(&file, &results)?;
    }

    Ok(())
}
