//! Crate-level error types.

use thiserror::Error;

use crate::backend::BackendError;

/// Errors reported by scene, camera and global illumination operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    #[error("object id {0} already exists in scene")]
    DuplicateId(u32),
    #[error("object name '{0}' already exists in scene")]
    DuplicateName(String),
    #[error("no object with id {0}")]
    UnknownObject(u32),
    #[error("no object named '{0}'")]
    UnknownName(String),
    #[error("object {0} has the wrong type for this operation")]
    WrongKind(u32),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("resolution {0:?} is not a power of two on every axis")]
    NotPowerOfTwo([u32; 3]),
    #[error("cascade {index} area half size is smaller than the preceding cascade")]
    CascadeOrder { index: usize },
    #[error("contract violation: {0}")]
    ContractViolation(String),
    #[error("scene is not initialized")]
    NotInitialized,
    #[error("resource not found: {0}")]
    ResourceNotFound(String),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

pub type RenderResult<T> = Result<T, RenderError>;

/// Report a programming-contract violation.
///
/// Loud in debug builds, recoverable `Err` in release builds.
pub(crate) fn contract_violation<T>(message: impl Into<String>) -> RenderResult<T> {
    let message = message.into();
    log::error!("{message}");
    debug_assert!(false, "{message}");
    Err(RenderError::ContractViolation(message))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RenderError::DuplicateName("box".to_string());
        assert_eq!(err.to_string(), "object name 'box' already exists in scene");

        let err = RenderError::CascadeOrder { index: 2 };
        assert_eq!(
            err.to_string(),
            "cascade 2 area half size is smaller than the preceding cascade"
        );
    }

    #[test]
    fn test_backend_error_converts() {
        let err: RenderError = BackendError::ReadbackFailed("mapping".into()).into();
        assert!(matches!(err, RenderError::Backend(_)));
    }
}
