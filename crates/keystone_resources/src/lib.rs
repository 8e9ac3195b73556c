//! Resource lifecycle management for Keystone hosts.
//!
//! A resource is a named bundle of scripts, maps and client files that the
//! host loads from storage and runs in its own execution context. This crate
//! keeps track of every resource the host knows about and moves them
//! through their lifecycle:
//!
//! - [`registry`] - Case-insensitive identity registry with sync-id and context indices
//! - [`sync_id`] - Compact 16-bit identifiers shared with clients
//! - [`resolver`] - Dependency lookup plus min-client and sync-option propagation
//! - [`controller`] - Start, stop and reload transitions
//! - [`queue`] - Deferred lifecycle operations, drained once per tick
//! - [`manager`] - The [`ResourceManager`](manager::ResourceManager) facade
//! - [`refresh`] - Reconciling the registry with storage
//! - [`plugin`] - [`ResourcesPlugin`](plugin::ResourcesPlugin) for the host
//!
//! # Lifecycle
//!
//! ```text
//! load ──► Loaded ──start──► Started ──stop──► Stopped ──start──► Started
//!                                 │                 │
//!                                 └─────unload──────┴──► (gone)
//! ```
//!
//! Stopping a resource first stops every running resource that depends on
//! it. Starting one first starts whatever it depends on.

pub mod config;
pub mod context;
pub mod controller;
pub mod error;
pub mod manager;
pub mod path;
pub mod plugin;
pub mod queue;
pub mod refresh;
pub mod registry;
pub mod resolver;
pub mod resource;
pub mod storage;
pub mod sync_id;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use crate::config::ManagerConfig;
    pub use crate::context::{ContextError, ContextRequest, ExecutionHost};
    pub use crate::controller::{BulkFailure, BulkReport, StartOptions, StatusCounters};
    pub use crate::error::{ErrorCode, ResourceError, ResourceResult};
    pub use crate::manager::{ListFilter, ResourceManager};
    pub use crate::path::ResourcePath;
    pub use crate::plugin::{ProcessQueue, ResourcesPlugin};
    pub use crate::queue::{LifecycleQueue, QueueKind, QueuedOperation};
    pub use crate::refresh::{RefreshReport, RefreshTarget};
    pub use crate::resolver::DependencyReport;
    pub use crate::resource::{
        ClientResourceInfo, ClientVersion, ContextHandle, Resource, ResourceInfo,
        ResourceManifest, ResourceState, StartFlags, StoredResource, SyncId,
    };
    pub use crate::storage::{MemoryStorage, ResourceStorage, StorageError};
}
