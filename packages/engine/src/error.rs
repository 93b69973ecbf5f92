//! Error taxonomy for the AMAS engine.
//!
//! Six kinds, realised as variants of one enum so the whole crate shares a
//! single `impl std::error::Error`. Only [`AmasError::ConfigViolation`] is
//! allowed to reach `main()` unrecovered; every other variant is caught at
//! the orchestrator boundary and converted into a logged, best-effort
//! fallback so that one user's failure can never propagate to another's
//! pipeline.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AmasError {
    /// NaN/Inf in features or reward. Always handled by replace-or-skip and
    /// a `tracing::warn!` at the point of occurrence.
    #[error("input sanitisation: {0}")]
    InputSanitisation(String),

    /// Cholesky rank-1 failure or diagonal out of range.
    #[error("numeric instability: {0}")]
    NumericInstability(#[from] amas_algo::MatrixError),

    /// A restored snapshot failed an invariant check (wrong dimension,
    /// asymmetric matrix, NaNs).
    #[error("state corruption: {0}")]
    StateCorruption(String),

    /// The event's deadline passed mid-pipeline.
    #[error("deadline exceeded mid-pipeline")]
    Timeout,

    /// A persistence write failed.
    #[error("persistence failure: {0}")]
    PersistenceFailure(String),

    /// A boot-time configuration invariant was violated. The only variant
    /// permitted to reach `main()`.
    #[error("configuration violation: {0}")]
    ConfigViolation(String),
}

pub type AmasResult<T> = Result<T, AmasError>;
