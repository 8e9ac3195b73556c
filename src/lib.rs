//! A plugin host for game servers with dependency-aware resource lifecycle
//! management.
//!
//! - [`host`] - The plugin host runtime
//! - [`core_plugins`] - Host info, clock and tracing plugins
//! - [`resources`] - Resource registry, dependency resolution and lifecycle queue
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicU64, Ordering};
//!
//! use keystone::prelude::*;
//!
//! struct Contexts(AtomicU64);
//!
//! impl ExecutionHost for Contexts {
//!     fn create(&self, _request: &ContextRequest) -> Result<ContextHandle, ContextError> {
//!         Ok(ContextHandle(self.0.fetch_add(1, Ordering::SeqCst)))
//!     }
//!
//!     fn destroy(&self, _handle: ContextHandle) {}
//! }
//!
//! let storage = Arc::new(MemoryStorage::new());
//! storage.insert("mapmanager", StoredResource::default());
//!
//! let mut host = Host::new();
//! host.add_plugins(MinimalPlugins.build())
//!     .add_plugins(ResourcesPlugin::new(storage, Arc::new(Contexts(AtomicU64::new(1)))));
//! host.finish().unwrap();
//!
//! host.state_mut::<ResourceManager>()
//!     .unwrap()
//!     .enqueue(QueuedOperation::start("mapmanager", StartFlags::ALL));
//! host.tick::<ProcessQueue>();
//!
//! let manager = host.state::<ResourceManager>().unwrap();
//! assert!(manager.resource("mapmanager").unwrap().is_started());
//! ```

pub use keystone_core as core_plugins;
pub use keystone_host as host;
pub use keystone_resources as resources;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use keystone_core::{
        Clock, ClockProvider, DefaultPlugins, HostInfo, HostInfoPlugin, MinimalPlugins,
        TimePlugin, TracingConfig, TracingFormat, TracingPlugin,
    };
    pub use keystone_host::prelude::*;
    pub use keystone_resources::prelude::*;
}
