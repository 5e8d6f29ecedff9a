//! Tenancy error taxonomy.

use orgspace_core::Error;

/// Errors raised by the registry, resolver, connection cache and data layer.
///
/// `Clone` so that one in-flight handle creation can hand the same failure to
/// every caller waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TenancyError {
    /// Malformed input (bad slug, empty name). Never retried.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Duplicate slug or domain.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Unknown tenant id, slug or domain.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Tenant exists but does not serve traffic.
    #[error("Tenant not active: {0}")]
    Inactive(String),

    /// No tenant identifier on a request that requires one.
    #[error("Tenant not specified: {0}")]
    NotSpecified(String),

    /// Handle creation or probe failed.
    #[error("Connectivity failure: {0}")]
    Connectivity(String),

    /// Write attempted while running on the degraded fallback.
    #[error("Service degraded: {0}")]
    Degraded(String),

    /// The backing store rejected an operation.
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),

    /// The connection cache is draining and accepts no new work.
    #[error("Connection cache closed")]
    CacheClosed,
}

impl TenancyError {
    /// HTTP status class for this error.
    pub fn status_code(&self) -> u16 {
        Error::from(self.clone()).status_code()
    }
}

impl From<TenancyError> for Error {
    fn from(err: TenancyError) -> Self {
        match err {
            TenancyError::Validation(m) => Error::Validation(m),
            TenancyError::Conflict(m) => Error::Conflict(m),
            TenancyError::NotFound(m) => Error::NotFound(m),
            TenancyError::Inactive(m) => Error::Forbidden(m),
            TenancyError::NotSpecified(m) => Error::BadRequest(m),
            TenancyError::Connectivity(m) => Error::ServiceUnavailable(m),
            TenancyError::Degraded(m) => Error::ServiceUnavailable(m),
            TenancyError::Storage(m) => Error::Internal(m),
            TenancyError::Internal(m) => Error::Internal(m),
            TenancyError::CacheClosed => {
                Error::ServiceUnavailable("Connection cache is shutting down".to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classes() {
        assert_eq!(TenancyError::Validation("x".into()).status_code(), 400);
        assert_eq!(TenancyError::Conflict("x".into()).status_code(), 409);
        assert_eq!(TenancyError::NotFound("x".into()).status_code(), 404);
        assert_eq!(TenancyError::Inactive("x".into()).status_code(), 403);
        assert_eq!(TenancyError::NotSpecified("x".into()).status_code(), 400);
        assert_eq!(TenancyError::Connectivity("x".into()).status_code(), 503);
        assert_eq!(TenancyError::Degraded("x".into()).status_code(), 503);
        assert_eq!(TenancyError::Storage("x".into()).status_code(), 500);
        assert_eq!(TenancyError::Internal("x".into()).status_code(), 500);
        assert_eq!(TenancyError::CacheClosed.status_code(), 503);
    }

    #[test]
    fn test_message_survives_conversion() {
        let err: Error = TenancyError::Inactive("Organization 'Acme' is not active".into()).into();
        assert_eq!(err.detail(), "Organization 'Acme' is not active");
    }
}
