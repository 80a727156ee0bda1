// Types-specific error types
// These errors are specifically for the tether-types crate

use thiserror::Error;

use crate::{ErrorCode, ErrorDomain, TetherError};

/// Types-specific error codes
pub mod codes {
    use crate::ErrorCode;

    // Types error codes start with 2000
    pub const ADAPTATION_ERROR: ErrorCode = ErrorCode(2001);
    pub const NO_HANDLER_ERROR: ErrorCode = ErrorCode(2002);
    pub const MISSING_FIELD: ErrorCode = ErrorCode(2003);
    pub const UNDECLARED_FIELD: ErrorCode = ErrorCode(2004);
    pub const IMMUTABLE_OBJECT: ErrorCode = ErrorCode(2005);
    pub const INDEX_OUT_OF_RANGE: ErrorCode = ErrorCode(2006);
    pub const SYNC_ERROR: ErrorCode = ErrorCode(2007);
}

/// Types-specific error types
#[derive(Error, Debug, Clone)]
pub enum TypesError {
    /// Value cannot be cast or masked into the target shape
    #[error("Cannot adapt value to shape: {0}")]
    AdaptationError(String),

    /// No collection strategy registered for the requested representation
    #[error("No collection handler registered for: {0}")]
    NoHandlerError(String),

    /// A required field is absent from the underlying storage
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// The field is not declared by the visible shape
    #[error("Field not declared by shape: {0}")]
    UndeclaredField(String),

    /// The underlying host object does not allow writes
    #[error("Cannot write to read-only object field: {0}")]
    ImmutableObject(String),

    /// Index write outside the addressable range of a list field
    #[error("Index out of range: {0}")]
    IndexOutOfRange(String),

    /// Lock acquisition failure on shared storage
    #[error("Sync error: {0}")]
    SyncError(String),
}

impl TetherError for TypesError {
    fn code(&self) -> ErrorCode {
        use codes::*;
        match self {
            TypesError::AdaptationError(_) => ADAPTATION_ERROR,
            TypesError::NoHandlerError(_) => NO_HANDLER_ERROR,
            TypesError::MissingField(_) => MISSING_FIELD,
            TypesError::UndeclaredField(_) => UNDECLARED_FIELD,
            TypesError::ImmutableObject(_) => IMMUTABLE_OBJECT,
            TypesError::IndexOutOfRange(_) => INDEX_OUT_OF_RANGE,
            TypesError::SyncError(_) => SYNC_ERROR,
        }
    }

    fn domain(&self) -> ErrorDomain {
        ErrorDomain::Types
    }
}

/// Result type for types operations
pub type TypesResult<T> = std::result::Result<T, TypesError>;
