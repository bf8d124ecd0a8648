use crate::recognition::{CatalogError, IngestError, MatchError};

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    AlreadyExists(String),

    #[error("extraction failed: {0}")]
    Extraction(#[from] IngestError),

    #[error("io error: {0:?}")]
    IO(#[from] std::io::Error),

    #[error("Base64: {0:?}")]
    Base64(#[from] base64::DecodeError),

    #[error("unexpected error: {0:?}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Caller mistakes, as opposed to service failures.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AppError::InvalidInput(_)
                | AppError::NotFound(_)
                | AppError::AlreadyExists(_)
                | AppError::Base64(_)
        )
    }
}

impl From<CatalogError> for AppError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::GroupNotFound(_)
            | CatalogError::IdentityNotFound { .. }
            | CatalogError::SlotNotFound { .. } => AppError::NotFound(err.to_string()),
            CatalogError::GroupExists(_) | CatalogError::IdentityInOtherGroup { .. } => {
                AppError::AlreadyExists(err.to_string())
            }
            CatalogError::InvalidName { .. } | CatalogError::DimensionMismatch { .. } => {
                AppError::InvalidInput(err.to_string())
            }
            CatalogError::Persist(err) => AppError::Other(err.into()),
        }
    }
}

impl From<MatchError> for AppError {
    fn from(err: MatchError) -> Self {
        AppError::InvalidInput(err.to_string())
    }
}
