//! The execution-context collaborator.
//!
//! The host creates and destroys the sandboxed interpreter each running
//! resource gets. The manager only records which handle belongs to which
//! resource.

use thiserror::Error;

use crate::resource::{ContextHandle, StartFlags, SyncId};

/// Failure reported by an [`ExecutionHost`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ContextError(pub String);

impl ContextError {
    /// Creates an error from a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// What the host needs to create a context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextRequest {
    /// Resource name.
    pub name: String,
    /// Sync id allocated for this run.
    pub sync_id: SyncId,
    /// Parts to activate.
    pub parts: StartFlags,
}

/// Creates and tears down execution contexts.
///
/// Calls are synchronous from the manager's point of view. A host backed by
/// asynchronous machinery must block until the context exists.
pub trait ExecutionHost: Send + Sync + 'static {
    /// Creates a context for a starting resource.
    ///
    /// # Errors
    ///
    /// Returns the reason the context could not be created.
    fn create(&self, request: &ContextRequest) -> Result<ContextHandle, ContextError>;

    /// Tears down a context. Unknown handles are ignored.
    fn destroy(&self, handle: ContextHandle);
}
