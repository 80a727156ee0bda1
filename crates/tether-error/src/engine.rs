// Engine-specific error types
// These errors are specifically for the tether-engine crate

use thiserror::Error;

use crate::types::TypesError;
use crate::{ErrorCode, ErrorDomain, TetherError};

/// Engine-specific error codes
pub mod codes {
    use crate::ErrorCode;

    // Engine error codes start with 5000
    pub const SHAPE_DERIVATION: ErrorCode = ErrorCode(5001);
    pub const DISPATCH_FAILURE: ErrorCode = ErrorCode(5002);
    pub const SCRIPT_FAILURE: ErrorCode = ErrorCode(5003);
    pub const INVALID_STATE: ErrorCode = ErrorCode(5004);
    pub const SYNC_ERROR: ErrorCode = ErrorCode(5005);
    pub const MARSHALLING: ErrorCode = ErrorCode(5006);
}

/// Engine-specific error types
#[derive(Error, Debug, Clone)]
pub enum EngineError {
    /// Introspection of a service's input/output shape failed
    #[error("Could not derive interface shape: {0}")]
    ShapeDerivation(String),

    /// Service execution raised an error, sync or async
    #[error("Service dispatch failed: {0}")]
    DispatchFailure(String),

    /// The underlying script evaluation failed
    #[error("Script execution failed: {0}")]
    ScriptFailure(String),

    /// Lifecycle transition attempted from an incompatible state
    #[error("Invalid dispatch state: {0}")]
    InvalidState(String),

    /// Lock acquisition failure on shared engine state
    #[error("Sync error: {0}")]
    SyncError(String),

    /// Marshalling failure bubbled up from the types layer
    #[error("Marshalling error: {0}")]
    Marshalling(#[from] TypesError),
}

impl TetherError for EngineError {
    fn code(&self) -> ErrorCode {
        use codes::*;
        match self {
            EngineError::ShapeDerivation(_) => SHAPE_DERIVATION,
            EngineError::DispatchFailure(_) => DISPATCH_FAILURE,
            EngineError::ScriptFailure(_) => SCRIPT_FAILURE,
            EngineError::InvalidState(_) => INVALID_STATE,
            EngineError::SyncError(_) => SYNC_ERROR,
            EngineError::Marshalling(_) => MARSHALLING,
        }
    }

    fn domain(&self) -> ErrorDomain {
        ErrorDomain::Engine
    }
}

/// Result type for engine operations
pub type EngineResult<T> = std::result::Result<T, EngineError>;
