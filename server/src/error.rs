//! Error types for the session server
//!
//! Handlers inside the gateway never surface errors to clients. Instead every
//! engine operation reports a [`Rejection`], which separates input the server
//! chose to ignore from genuine internal faults. The gateway logs both and
//! carries on, so a bad payload can never take down the event loop.

use crate::connection::ConnectionId;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;
use uuid::Uuid;

/// Internal faults and transport failures.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to encode outbound event: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("connection {0} is already closed")]
    ConnectionClosed(ConnectionId),

    #[error("malformed {0} payload")]
    MalformedPayload(&'static str),

    #[error("poll {0} already exists")]
    DuplicatePoll(Uuid),

    #[error("session gateway is not running")]
    GatewayUnavailable,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Input the engine ignores without changing any state.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Ignored {
    #[error("missing {0}")]
    MissingField(&'static str),

    #[error("unknown poll {0:?}")]
    UnknownPoll(String),

    #[error("option {0:?} is not on the poll")]
    UnknownOption(String),
}

/// Why an engine operation had no observable effect.
#[derive(Debug, Error)]
pub enum Rejection {
    #[error("ignored: {0}")]
    Ignored(#[from] Ignored),

    #[error("internal fault: {0}")]
    Fault(#[from] ServerError),
}

impl Rejection {
    pub fn is_fault(&self) -> bool {
        matches!(self, Rejection::Fault(_))
    }
}

impl From<serde_json::Error> for Rejection {
    fn from(err: serde_json::Error) -> Self {
        Rejection::Fault(ServerError::Encode(err))
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = match self {
            ServerError::GatewayUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}
