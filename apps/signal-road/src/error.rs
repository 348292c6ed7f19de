use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use signal_proto::ErrorBody;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SignalError {
    #[error("caller identity missing or invalid")]
    Unauthenticated,
    #[error("caller is not a participant of this session")]
    Forbidden,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("backend error: {0}")]
    Backend(String),
}

impl SignalError {
    pub fn code(&self) -> &'static str {
        match self {
            SignalError::Unauthenticated => "unauthenticated",
            SignalError::Forbidden => "forbidden",
            SignalError::NotFound(_) => "not_found",
            SignalError::InvalidPayload(_) => "invalid_payload",
            SignalError::InvalidState(_) => "invalid_state",
            SignalError::Backend(_) => "backend",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            SignalError::Unauthenticated => StatusCode::UNAUTHORIZED,
            SignalError::Forbidden => StatusCode::FORBIDDEN,
            SignalError::NotFound(_) => StatusCode::NOT_FOUND,
            SignalError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            SignalError::InvalidState(_) => StatusCode::CONFLICT,
            SignalError::Backend(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<redis::RedisError> for SignalError {
    fn from(err: redis::RedisError) -> Self {
        SignalError::Backend(err.to_string())
    }
}

impl From<serde_json::Error> for SignalError {
    fn from(err: serde_json::Error) -> Self {
        SignalError::Backend(format!("corrupt room record: {err}"))
    }
}

impl IntoResponse for SignalError {
    fn into_response(self) -> Response {
        if let SignalError::Backend(detail) = &self {
            tracing::error!(error = %detail, "signaling backend failure");
        }
        let body = ErrorBody {
            ok: false,
            error: self.code().to_string(),
            message: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}
