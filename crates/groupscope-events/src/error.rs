use thiserror::Error;

use crate::backend::Backend;

pub type QueryResult<T> = Result<T, QueryError>;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("group {0} not found")]
    GroupNotFound(u64),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("{backend} backend unavailable: {message}")]
    BackendUnavailable { backend: Backend, message: String },
    #[error("{backend} backend error: {message}")]
    Backend { backend: Backend, message: String },
}

impl QueryError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub fn backend_unavailable(backend: Backend, message: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            backend,
            message: message.into(),
        }
    }

    pub fn backend(backend: Backend, message: impl Into<String>) -> Self {
        Self::Backend {
            backend,
            message: message.into(),
        }
    }

    /// The store that produced this error, if any.
    pub fn source_backend(&self) -> Option<Backend> {
        match self {
            Self::BackendUnavailable { backend, .. } | Self::Backend { backend, .. } => {
                Some(*backend)
            }
            Self::GroupNotFound(_) | Self::InvalidArgument(_) => None,
        }
    }
}
