use crate::types::CustomerId;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyticsError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid argument '{name}': {reason}")]
    InvalidArgument { name: &'static str, reason: String },

    /// Internal to single-customer lookups; the engine reports these as 0.0.
    #[error("Customer {0} not found")]
    CustomerNotFound(CustomerId),

    #[error("Configuration error: {0}")]
    Config(String),

    /// An error raised by a computation that another caller was waiting on.
    #[error(transparent)]
    Shared(#[from] Arc<AnalyticsError>),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AnalyticsError {
    pub fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument { name, reason: reason.into() }
    }

    /// True when the failure is a caller mistake rather than an upstream fault.
    pub fn is_invalid_argument(&self) -> bool {
        match self {
            Self::InvalidArgument { .. } => true,
            Self::Shared(inner) => inner.is_invalid_argument(),
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            Self::CustomerNotFound(_) => true,
            Self::Shared(inner) => inner.is_not_found(),
            _ => false,
        }
    }
}

pub type AnalyticsResult<T> = Result<T, AnalyticsError>;
