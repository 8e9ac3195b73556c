//! Typed host state.
//!
//! Host state is process-lifetime data owned by the [`Host`](crate::host::Host)
//! and shared between plugins: configuration, the clock, the resource
//! manager. Each type is stored at most once and looked up by [`TypeId`].

use core::any::{Any, TypeId};
use hashbrown::HashMap;

/// Marker trait for types that can be stored as host state.
///
/// # Example
///
/// ```
/// use keystone_host::state::{HostState, StateMap};
///
/// struct TickRate(u32);
/// impl HostState for TickRate {}
///
/// let mut state = StateMap::new();
/// state.insert(TickRate(20));
/// assert_eq!(state.get::<TickRate>().map(|rate| rate.0), Some(20));
/// ```
pub trait HostState: Send + Sync + 'static {}

/// Container of host state values, keyed by type.
#[derive(Default)]
pub struct StateMap {
    values: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl StateMap {
    /// Creates an empty container.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a value, returning the previous value of the same type.
    pub fn insert<S: HostState>(&mut self, value: S) -> Option<S> {
        self.values
            .insert(TypeId::of::<S>(), Box::new(value))
            .and_then(|old| old.downcast::<S>().ok())
            .map(|old| *old)
    }

    /// Returns a reference to the value of type `S`.
    #[must_use]
    pub fn get<S: HostState>(&self) -> Option<&S> {
        self.values
            .get(&TypeId::of::<S>())
            .and_then(|boxed| boxed.downcast_ref::<S>())
    }

    /// Returns a mutable reference to the value of type `S`.
    #[must_use]
    pub fn get_mut<S: HostState>(&mut self) -> Option<&mut S> {
        self.values
            .get_mut(&TypeId::of::<S>())
            .and_then(|boxed| boxed.downcast_mut::<S>())
    }

    /// Removes and returns the value of type `S`.
    pub fn remove<S: HostState>(&mut self) -> Option<S> {
        self.values
            .remove(&TypeId::of::<S>())
            .and_then(|old| old.downcast::<S>().ok())
            .map(|old| *old)
    }

    /// Returns true if a value of type `S` is stored.
    #[must_use]
    pub fn contains<S: HostState>(&self) -> bool {
        self.values.contains_key(&TypeId::of::<S>())
    }

    /// Returns the number of stored values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl core::fmt::Debug for StateMap {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StateMap")
            .field("len", &self.values.len())
            .finish()
    }
}
