extern crate failure;
extern crate mfrec;
#[macro_use]
extern crate tracing;

use mfrec::config::{init_logging, RunConfig};
use mfrec::data::{Ratings, Schema};
use mfrec::encoding::IdEncoder;
use mfrec::models::factorization::Hyperparameters;
use mfrec::models::Loss;
use mfrec::predictor::Predictor;

const DATA_FILE: &str = "Amazon0302.txt";

const PRODUCT_ID: u64 = 3;
const CO_PURCHASE_ID: u64 = 63;

fn main() -> Result<(), failure::Error> {
    init_logging();
    let config = RunConfig::from_env()?;

    let ratings = Ratings::from_path(config.data_dir.join(DATA_FILE), &Schema::co_purchase())?;

    let hyper = config.hyperparameters(Hyperparameters::new(
        8,
        20,
        0.025,
        0.01,
        Loss::OneClassSquared,
    ))?;

    let mut encoder = IdEncoder::new();
    let encoded = encoder.encode_ratings(&ratings);

    let model = hyper.build()?.fit(&encoded)?;
    let predictor = Predictor::new(encoder, model);

    match predictor.predict(PRODUCT_ID, CO_PURCHASE_ID) {
        Ok(score) => {
            println!("ProductID: {} CoPurchaseProductID: {}", PRODUCT_ID, CO_PURCHASE_ID);
            println!("Prediction Score: {}", score);
        }
        Err(error) => warn!(%error, "Cannot score the sample pair"),
    }

    if let Some(ref path) = config.model_path {
        predictor.save(path)?;
    }

    Ok(())
}
