//! Host assembly errors.

/// Error raised by [`Host::finish`](crate::host::Host::finish) and plugin registration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    /// A unique plugin was added more than once.
    #[error("plugin '{0}' is unique and was already added")]
    DuplicatePlugin(String),

    /// A plugin declared a dependency that was never added.
    #[error("plugin '{plugin}' requires '{dependency}' which was not added")]
    MissingDependency {
        /// The plugin declaring the dependency.
        plugin: String,
        /// The missing dependency.
        dependency: String,
    },

    /// Plugin dependencies form a cycle.
    #[error("circular dependency detected among plugins: {0:?}")]
    DependencyCycle(Vec<String>),

    /// `finish()` was called on a host that is already built.
    #[error("host was already built")]
    AlreadyBuilt,
}
