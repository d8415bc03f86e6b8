use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Operation failed: {0}")]
    Operation(String),

    /// An index references something the corpus does not contain.
    #[error("Inconsistent index: {0}")]
    Inconsistent(String),
}

pub type Result<T> = std::result::Result<T, Error>;
