use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnnalError {
    #[error("configuration error: {message}")]
    Configuration { message: String },
    #[error("ambiguous result: expected at most one row, got {rows}")]
    AmbiguousResult { rows: usize },
    #[error("encoding error: {message}")]
    Encoding { message: String },
    #[error("validation error: {message}")]
    Validation { message: String },
    #[error("storage error: {message}")]
    Storage { message: String },
}

impl AnnalError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn ambiguous(rows: usize) -> Self {
        Self::AmbiguousResult { rows }
    }

    pub fn encoding(message: impl Into<String>) -> Self {
        Self::Encoding {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }
}

pub type AnnalResult<T> = Result<T, AnnalError>;

impl From<sea_orm::DbErr> for AnnalError {
    fn from(value: sea_orm::DbErr) -> Self {
        AnnalError::storage(value.to_string())
    }
}
