//! Models module.
mod als;
pub mod factorization;
mod negatives;
mod sgd;

/// The loss used for training the model.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum Loss {
    /// Squared error over observed ratings (explicit feedback).
    SquaredError,
    /// Squared error over observed pairs plus sampled unobserved pairs
    /// pulled towards a negative target (positive-only feedback).
    OneClassSquared,
}

/// Optimization routine used to fit the factors.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum Solver {
    /// Alternate closed-form ridge solves of every subject row and every
    /// object row. Does not use the learning rate.
    AlternatingLeastSquares,
    /// Stochastic gradient descent over the ratings in shuffled order.
    GradientDescent,
}
