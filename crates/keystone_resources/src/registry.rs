//! The identity registry.
//!
//! An insertion-ordered arena of [`Resource`] records keyed by lowercase
//! name, with secondary indices from sync id and context handle back to the
//! owning key. The records hold the forward mapping; the indices only exist
//! for lookups and are kept in step on every mutation.

use hashbrown::HashMap;
use indexmap::IndexMap;

use crate::error::{ResourceError, ResourceResult};
use crate::resource::{ContextHandle, Resource, ResourceState, StoredResource, SyncId, key_of};

/// The canonical collection of resources known to the host.
#[derive(Debug, Default)]
pub struct Registry {
    resources: IndexMap<String, Resource>,
    by_sync_id: HashMap<SyncId, String>,
    by_context: HashMap<ContextHandle, String>,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a resource.
    ///
    /// # Errors
    ///
    /// [`ResourceError::DuplicateName`] if the name is taken, ignoring case.
    /// The registry is left unchanged.
    pub fn register(&mut self, resource: Resource) -> ResourceResult<()> {
        let key = resource.key();
        if self.resources.contains_key(&key) {
            return Err(ResourceError::DuplicateName(resource.name));
        }

        if let Some(id) = resource.sync_id {
            self.by_sync_id.insert(id, key.clone());
        }
        if let Some(handle) = resource.context {
            self.by_context.insert(handle, key.clone());
        }
        self.resources.insert(key, resource);
        Ok(())
    }

    /// Removes a resource and both of its reverse index entries.
    ///
    /// # Errors
    ///
    /// - [`ResourceError::NotFound`] if no such resource exists
    /// - [`ResourceError::InvalidState`] if it is still started
    pub fn unregister(&mut self, name: &str) -> ResourceResult<Resource> {
        let key = key_of(name);
        let resource = self
            .resources
            .get(&key)
            .ok_or_else(|| ResourceError::not_found(name))?;
        if resource.state == ResourceState::Started {
            return Err(ResourceError::InvalidState {
                resource: resource.name.clone(),
                state: resource.state,
                operation: "unregister",
            });
        }

        let resource = self
            .resources
            .shift_remove(&key)
            .ok_or_else(|| ResourceError::not_found(name))?;
        if let Some(id) = resource.sync_id {
            self.by_sync_id.remove(&id);
        }
        if let Some(handle) = resource.context {
            self.by_context.remove(&handle);
        }
        Ok(resource)
    }

    /// Replaces the stored metadata of a stopped resource.
    pub(crate) fn update(&mut self, name: &str, stored: StoredResource) -> ResourceResult<()> {
        let resource = self
            .resources
            .get_mut(&key_of(name))
            .ok_or_else(|| ResourceError::not_found(name))?;
        if resource.state == ResourceState::Started {
            return Err(ResourceError::InvalidState {
                resource: resource.name.clone(),
                state: resource.state,
                operation: "update",
            });
        }
        resource.manifest = stored.manifest;
        resource.organizational_path = stored.organizational_path;
        resource.size = stored.size;
        Ok(())
    }

    /// Looks a resource up by name, ignoring case.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Resource> {
        self.resources.get(&key_of(name))
    }

    pub(crate) fn get_mut(&mut self, name: &str) -> Option<&mut Resource> {
        self.resources.get_mut(&key_of(name))
    }

    /// Returns true if a resource with this name is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.resources.contains_key(&key_of(name))
    }

    /// Looks a resource up by its sync id.
    #[must_use]
    pub fn find_by_sync_id(&self, id: SyncId) -> Option<&Resource> {
        self.by_sync_id
            .get(&id)
            .and_then(|key| self.resources.get(key))
    }

    /// Looks a resource up by its execution context.
    #[must_use]
    pub fn find_by_context(&self, handle: ContextHandle) -> Option<&Resource> {
        self.by_context
            .get(&handle)
            .and_then(|key| self.resources.get(key))
    }

    pub(crate) fn assign_sync_id(&mut self, name: &str, id: SyncId) -> ResourceResult<()> {
        let key = key_of(name);
        let resource = self
            .resources
            .get_mut(&key)
            .ok_or_else(|| ResourceError::not_found(name))?;
        if let Some(old) = resource.sync_id.replace(id) {
            self.by_sync_id.remove(&old);
        }
        self.by_sync_id.insert(id, key);
        Ok(())
    }

    pub(crate) fn clear_sync_id(&mut self, name: &str) -> Option<SyncId> {
        let id = self.resources.get_mut(&key_of(name))?.sync_id.take()?;
        self.by_sync_id.remove(&id);
        Some(id)
    }

    /// Records that `handle` is the execution context of `name`.
    ///
    /// A handle previously associated with another resource is moved.
    ///
    /// # Errors
    ///
    /// [`ResourceError::NotFound`] if no such resource exists.
    pub fn associate_context(&mut self, name: &str, handle: ContextHandle) -> ResourceResult<()> {
        let key = key_of(name);
        if !self.resources.contains_key(&key) {
            return Err(ResourceError::not_found(name));
        }

        if let Some(previous_owner) = self.by_context.insert(handle, key.clone())
            && previous_owner != key
            && let Some(other) = self.resources.get_mut(&previous_owner)
        {
            other.context = None;
        }
        if let Some(resource) = self.resources.get_mut(&key)
            && let Some(old) = resource.context.replace(handle)
            && old != handle
        {
            self.by_context.remove(&old);
        }
        Ok(())
    }

    /// Clears the execution context of `name`, returning the old handle.
    ///
    /// Dissociating a resource that has no context, or that does not exist,
    /// is a no-op.
    pub fn dissociate_context(&mut self, name: &str) -> Option<ContextHandle> {
        let handle = self.resources.get_mut(&key_of(name))?.context.take()?;
        self.by_context.remove(&handle);
        Some(handle)
    }

    /// Resource names in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.resources
            .values()
            .map(|resource| resource.name.clone())
            .collect()
    }

    /// Owned copy of every record in registration order.
    ///
    /// The copy stays valid while the registry changes underneath it.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Resource> {
        self.resources.values().cloned().collect()
    }

    /// Iterates records in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Resource> {
        self.resources.values()
    }

    /// Number of registered resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Sum of on-disk sizes. Informational only.
    #[must_use]
    pub fn total_stored_size(&self) -> u64 {
        self.resources.values().map(|resource| resource.size).sum()
    }
}
