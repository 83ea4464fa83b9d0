//! Room translation server
//!
//! Streaming chat endpoint, session lifecycle, and the participant
//! settings mutation route.

pub mod chat;
pub mod http;
pub mod metrics;
pub mod session;
pub mod state;

pub use http::create_router;
pub use session::{DetachReason, SessionRegistry, SessionState, SessionStats};
pub use state::AppState;

use thiserror::Error;

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Session error: {0}")]
    Session(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Capacity exceeded")]
    Capacity,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<ServerError> for axum::http::StatusCode {
    fn from(err: ServerError) -> Self {
        match err {
            ServerError::Session(_) => axum::http::StatusCode::NOT_FOUND,
            ServerError::Protocol(_) => axum::http::StatusCode::BAD_REQUEST,
            ServerError::Capacity => axum::http::StatusCode::SERVICE_UNAVAILABLE,
            ServerError::Internal(_) => axum::http::StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
