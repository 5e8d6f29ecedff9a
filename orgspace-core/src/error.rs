// Error types shared by every Orgspace crate that speaks HTTP

use crate::HttpResponse;
use serde::Serialize;
use thiserror::Error;

/// Message substituted for server-side failures when internal detail is hidden.
pub const GENERIC_SERVER_ERROR: &str = "An internal error occurred";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // 4xx Client Errors
    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Method not allowed: {0}")]
    MethodNotAllowed(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    // 5xx Server Errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Service Unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Gateway Timeout: {0}")]
    GatewayTimeout(String),
}

/// JSON body rendered for every error response.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

impl Error {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Error::BadRequest(_) | Error::Validation(_) | Error::Deserialization(_) => 400,
            Error::Unauthorized(_) => 401,
            Error::Forbidden(_) => 403,
            Error::NotFound(_) => 404,
            Error::MethodNotAllowed(_) => 405,
            Error::Conflict(_) => 409,
            Error::Serialization(_) | Error::Internal(_) => 500,
            Error::ServiceUnavailable(_) => 503,
            Error::GatewayTimeout(_) => 504,
        }
    }

    /// Check if this is a client error (4xx)
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }

    /// Check if this is a server error (5xx)
    pub fn is_server_error(&self) -> bool {
        self.status_code() >= 500
    }

    /// Short reason phrase used as the `error` field of the JSON body.
    pub fn reason(&self) -> &'static str {
        match self {
            Error::BadRequest(_) => "Bad Request",
            Error::Validation(_) => "Validation Failed",
            Error::Deserialization(_) => "Invalid Body",
            Error::Unauthorized(_) => "Unauthorized",
            Error::Forbidden(_) => "Forbidden",
            Error::NotFound(_) => "Not Found",
            Error::MethodNotAllowed(_) => "Method Not Allowed",
            Error::Conflict(_) => "Conflict",
            Error::Serialization(_) | Error::Internal(_) => "Internal Server Error",
            Error::ServiceUnavailable(_) => "Service Unavailable",
            Error::GatewayTimeout(_) => "Gateway Timeout",
        }
    }

    /// The human-readable detail carried by the variant.
    pub fn detail(&self) -> &str {
        match self {
            Error::BadRequest(m)
            | Error::Validation(m)
            | Error::Deserialization(m)
            | Error::Unauthorized(m)
            | Error::Forbidden(m)
            | Error::NotFound(m)
            | Error::MethodNotAllowed(m)
            | Error::Conflict(m)
            | Error::Serialization(m)
            | Error::Internal(m)
            | Error::ServiceUnavailable(m)
            | Error::GatewayTimeout(m) => m,
        }
    }

    /// Build the JSON body for this error.
    ///
    /// Server errors only carry their detail when `expose_internal` is set;
    /// client errors always do.
    pub fn body(&self, expose_internal: bool) -> ErrorBody {
        let message = if self.is_server_error() && !expose_internal {
            GENERIC_SERVER_ERROR.to_string()
        } else {
            self.detail().to_string()
        };

        ErrorBody {
            error: self.reason().to_string(),
            message,
        }
    }

    /// Render this error as an HTTP response.
    pub fn into_response(self, expose_internal: bool) -> HttpResponse {
        let body = self.body(expose_internal);
        let status = self.status_code();
        match HttpResponse::new(status).with_json(&body) {
            Ok(response) => response,
            Err(_) => HttpResponse::new(status).with_body(body.message.into_bytes()),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Deserialization(err.to_string())
    }
}
