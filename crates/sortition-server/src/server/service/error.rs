use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use sortition::ValidationError;

/// Failure of a single request.
///
/// The response body is always the error message.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Sortition(#[from] sortition::Error),

    /// Selected content cannot be sent as a `Location` header.
    #[error("stored content is not a valid redirect target")]
    InvalidLocation,
}

impl ApiError {
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Sortition(sortition::Error::Validation(_)) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the process must stop serving after this error.
    pub const fn is_fatal(&self) -> bool {
        match self {
            Self::Sortition(err) => err.is_fatal(),
            Self::InvalidLocation => false,
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        Self::Sortition(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status_code(), self.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sortition::{EntropyError, Operation};

    #[test]
    fn validation_is_bad_request() {
        let err = ApiError::from(ValidationError::InvalidData);
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "invalid data");
        assert!(!err.is_fatal());
    }

    #[test]
    fn entropy_is_fatal_server_error() {
        let err = ApiError::from(sortition::Error::from(EntropyError::Source("gone".into())));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.is_fatal());
    }

    #[test]
    fn storage_is_recoverable_server_error() {
        let err = ApiError::from(sortition::Error::Storage {
            operation: Operation::AddItem,
            source: sqlx::Error::PoolClosed,
        });
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.to_string().starts_with("could not add item"));
        assert!(!err.is_fatal());
    }

    #[test]
    fn invalid_location_is_server_error() {
        assert_eq!(
            ApiError::InvalidLocation.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert!(!ApiError::InvalidLocation.is_fatal());
    }
}
