use crate::store::StoreError;

/// Outcome of a failed `consume` or bulk load. Each kind maps to exactly one
/// response status at the HTTP boundary.
#[derive(thiserror::Error, Debug)]
pub enum PostbackError {
    #[error("{0}")]
    Validation(String),

    #[error("no unique mapping for source")]
    NotFound,

    #[error("the store does not support streaming bulk load")]
    Unsupported,

    #[error("store error: {0}")]
    Upstream(#[from] StoreError),
}

impl PostbackError {
    /// Short label used to tag rejection metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            PostbackError::Validation(_) => "validation",
            PostbackError::NotFound => "not_found",
            PostbackError::Unsupported => "unsupported",
            PostbackError::Upstream(_) => "upstream",
        }
    }
}

/// Errors that stop the service from starting or serving.
#[derive(thiserror::Error, Debug)]
pub enum PostbackServiceError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
