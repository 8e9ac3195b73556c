//! Error types for resource management.

use serde::Serialize;
use thiserror::Error;

use crate::resource::ResourceState;
use crate::storage::StorageError;

/// Result alias for resource operations.
pub type ResourceResult<T> = Result<T, ResourceError>;

/// Errors returned by registry, controller and manager operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceError {
    /// A resource with this name (case-insensitive) is already registered.
    #[error("resource '{0}' is already registered")]
    DuplicateName(String),

    /// No registered resource has this name.
    #[error("resource '{0}' not found")]
    NotFound(String),

    /// A required resource is missing or failed to start.
    #[error("resource '{resource}' has unsatisfied dependencies: {}", missing.join(", "))]
    UnsatisfiedDependency {
        /// The resource whose start failed.
        resource: String,
        /// The dependencies that were missing or failed.
        missing: Vec<String>,
    },

    /// Resources depend on each other in a loop.
    #[error("dependency cycle: {}", cycle.join(" -> "))]
    DependencyCycle {
        /// The resources on the cycle, first repeated at the end.
        cycle: Vec<String>,
    },

    /// The execution host could not create a context.
    #[error("execution context for '{resource}' failed: {reason}")]
    ExecutionContextFailure {
        /// The resource being started.
        resource: String,
        /// Reason reported by the execution host.
        reason: String,
    },

    /// The operation is not valid in the resource's current state.
    #[error("cannot {operation} resource '{resource}' while {state}")]
    InvalidState {
        /// The resource.
        resource: String,
        /// Its current state.
        state: ResourceState,
        /// The rejected operation.
        operation: &'static str,
    },

    /// Every sync id is in use.
    #[error("no free sync ids")]
    SyncIdsExhausted,

    /// A `:resource/path` reference could not be parsed.
    #[error("invalid resource path '{0}'")]
    InvalidPath(String),

    /// Storage could not provide the resource.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Serializable error kind for administrative listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// See [`ResourceError::DuplicateName`].
    DuplicateName,
    /// See [`ResourceError::NotFound`].
    NotFound,
    /// See [`ResourceError::UnsatisfiedDependency`].
    UnsatisfiedDependency,
    /// See [`ResourceError::DependencyCycle`].
    DependencyCycle,
    /// See [`ResourceError::ExecutionContextFailure`].
    ExecutionContextFailure,
    /// See [`ResourceError::InvalidState`].
    InvalidState,
    /// See [`ResourceError::SyncIdsExhausted`].
    SyncIdsExhausted,
    /// See [`ResourceError::InvalidPath`].
    InvalidPath,
    /// See [`ResourceError::Storage`].
    Storage,
}

impl ResourceError {
    /// Returns the error kind.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::DuplicateName(_) => ErrorCode::DuplicateName,
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::UnsatisfiedDependency { .. } => ErrorCode::UnsatisfiedDependency,
            Self::DependencyCycle { .. } => ErrorCode::DependencyCycle,
            Self::ExecutionContextFailure { .. } => ErrorCode::ExecutionContextFailure,
            Self::InvalidState { .. } => ErrorCode::InvalidState,
            Self::SyncIdsExhausted => ErrorCode::SyncIdsExhausted,
            Self::InvalidPath(_) => ErrorCode::InvalidPath,
            Self::Storage(_) => ErrorCode::Storage,
        }
    }

    pub(crate) fn not_found(name: &str) -> Self {
        Self::NotFound(name.to_string())
    }
}
