//! Error types for the session store

use thiserror::Error;

use crate::types::SessionStatus;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(&'static str),

    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition {
        from: SessionStatus,
        to: SessionStatus,
    },

    #[error("User is not eligible for this operation: {0}")]
    NotEligible(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;
