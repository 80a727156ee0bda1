// Tether error handling framework
// Central location for error types, traits, and handling utilities

use std::fmt;

// Re-export common error handling tools for convenience
pub use anyhow;
pub use thiserror;

mod engine;
mod types;

pub use engine::{codes as engine_codes, EngineError, EngineResult};
pub use types::{codes as types_codes, TypesError, TypesResult};

/// Error domains representing different components of the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ErrorDomain {
    Types,
    Engine,
    External,
}

impl fmt::Display for ErrorDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorDomain::Types => write!(f, "types"),
            ErrorDomain::Engine => write!(f, "engine"),
            ErrorDomain::External => write!(f, "external"),
        }
    }
}

/// Error code structure for categorizing errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ErrorCode(pub u32);

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}", self.0)
    }
}

/// Base trait for all errors in the tether system.
pub trait TetherError: std::error::Error + fmt::Debug + Send + Sync + 'static {
    /// Returns the numeric code identifying this error.
    fn code(&self) -> ErrorCode;

    /// Returns the domain this error belongs to.
    fn domain(&self) -> ErrorDomain;

    /// Provides a brief description of the error (defaults to Display impl).
    fn description(&self) -> String {
        format!("{}", self)
    }
}

/// Standard error message format for serialization
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ErrorMessage {
    pub code: ErrorCode,
    pub domain: ErrorDomain,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorMessage {
    /// Build a serializable message from any tether error.
    pub fn from_error<E: TetherError>(error: &E) -> Self {
        ErrorMessage {
            code: error.code(),
            domain: error.domain(),
            // qualified: `std::error::Error` also has a `description`
            message: TetherError::description(error),
            details: None,
        }
    }

    /// Attach structured details to the message.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}
