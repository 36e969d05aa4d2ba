use thiserror::Error;

/// Fatal simulation errors. All of these abort the run; there are no
/// retries anywhere in the system.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("malformed process description at row {row}")]
    MalformedRow { row: usize },

    #[error("missing or invalid type count header")]
    InvalidHeader,

    #[error("inconsistent template: declared {declared} process types, found {found}")]
    TypeCountMismatch { declared: usize, found: usize },

    #[error("unknown process type `{0}`")]
    UnknownType(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
