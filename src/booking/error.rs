use thiserror::Error;

use crate::api::ApiError;
use crate::engine::EngineError;

use super::ValidationError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BookingError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("cannot submit while {state}")]
    InvalidTransition { state: &'static str },
}

impl BookingError {
    pub fn is_retryable(&self) -> bool {
        match self {
            BookingError::Api(e) => e.is_retryable(),
            _ => false,
        }
    }
}
