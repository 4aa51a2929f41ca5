use anyhow::Error as AnyError;
use thiserror::Error;

use crate::http::StatusCode;

/// Failure raised while relaying a single request. Every variant is recovered inside the gateway;
/// none of them escapes to the hosting runtime.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{message}")]
    BadRequest { message: String },
    #[error("upstream call failed: {source}")]
    Upstream { source: AnyError },
    #[error("upstream stream failed: {source}")]
    Stream { source: AnyError },
    #[error("caller disconnected")]
    Disconnected,
    #[error("internal error: {source}")]
    Internal {
        #[from]
        source: AnyError,
    },
}

impl GatewayError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        GatewayError::BadRequest {
            message: message.into(),
        }
    }

    pub fn upstream<E>(error: E) -> Self
    where
        E: Into<AnyError>,
    {
        GatewayError::Upstream {
            source: error.into(),
        }
    }

    pub fn stream<E>(error: E) -> Self
    where
        E: Into<AnyError>,
    {
        GatewayError::Stream {
            source: error.into(),
        }
    }

    pub fn internal<E>(error: E) -> Self
    where
        E: Into<AnyError>,
    {
        GatewayError::Internal {
            source: error.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            GatewayError::Upstream { .. } | GatewayError::Stream { .. } => StatusCode::BAD_GATEWAY,
            GatewayError::Disconnected => StatusCode::BAD_REQUEST,
            GatewayError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn message(&self) -> String {
        match self {
            GatewayError::BadRequest { message } => message.clone(),
            other => other.to_string(),
        }
    }

    pub fn cause(&self) -> Option<&AnyError> {
        match self {
            GatewayError::Upstream { source }
            | GatewayError::Stream { source }
            | GatewayError::Internal { source } => Some(source),
            GatewayError::BadRequest { .. } | GatewayError::Disconnected => None,
        }
    }

    pub fn is_disconnect(&self) -> bool {
        matches!(self, GatewayError::Disconnected)
    }
}
