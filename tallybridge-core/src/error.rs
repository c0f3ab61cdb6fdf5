//! Top-level error types for Tallybridge.

use thiserror::Error;

use crate::gateway::GatewayError;

/// Top-level error type encompassing all Tallybridge errors.
///
/// Gateway errors propagate through the reconciler unchanged so the caller
/// sees exactly which upstream failed and what it said.
#[derive(Debug, Error)]
pub enum TallybridgeError {
    /// Error from the token lifecycle or an upstream call.
    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// Missing or inconsistent deployment configuration.
    #[error("configuration error: {message}")]
    Config { message: String },

    /// Malformed filter input or upstream payload.
    #[error("validation error: {message}")]
    Validation { message: String },
}

impl TallybridgeError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}
