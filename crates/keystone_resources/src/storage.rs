//! The storage collaborator.
//!
//! Locating, unpacking and reading bundles is the host's business; the
//! manager only needs manifests, names and sizes.

use indexmap::IndexMap;
use parking_lot::RwLock;
use thiserror::Error;

use crate::resource::{ResourceManifest, StoredResource, key_of};

/// Errors reported by a [`ResourceStorage`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// Storage holds no resource with this name.
    #[error("resource '{0}' is not present in storage")]
    NotFound(String),

    /// The manifest could not be parsed.
    #[error("invalid manifest for '{name}': {reason}")]
    InvalidManifest {
        /// Resource name.
        name: String,
        /// Parse failure.
        reason: String,
    },

    /// Reading the bundle failed.
    #[error("i/o error reading '{name}': {reason}")]
    Io {
        /// Resource name.
        name: String,
        /// Underlying failure.
        reason: String,
    },
}

/// Source of resource bundles.
pub trait ResourceStorage: Send + Sync + 'static {
    /// Opens a resource and returns its manifest and metadata.
    ///
    /// # Errors
    ///
    /// [`StorageError::NotFound`] when the resource is absent.
    fn open(&self, name: &str) -> Result<StoredResource, StorageError>;

    /// Lists the resource names currently available, in a stable order.
    ///
    /// # Errors
    ///
    /// Returns an error when storage cannot be enumerated.
    fn enumerate(&self) -> Result<Vec<String>, StorageError>;

    /// Returns the on-disk footprint of a resource.
    ///
    /// # Errors
    ///
    /// [`StorageError::NotFound`] when the resource is absent.
    fn size(&self, name: &str) -> Result<u64, StorageError> {
        self.open(name).map(|stored| stored.size)
    }
}

/// In-memory storage, insertion ordered and case-insensitive.
///
/// # Example
///
/// ```
/// use keystone_resources::resource::{ResourceManifest, StoredResource};
/// use keystone_resources::storage::{MemoryStorage, ResourceStorage};
///
/// let storage = MemoryStorage::new();
/// storage.insert("mapmanager", StoredResource::new(ResourceManifest::default(), 512));
///
/// assert_eq!(storage.enumerate().unwrap(), vec!["mapmanager".to_string()]);
/// assert_eq!(storage.size("MapManager").unwrap(), 512);
/// ```
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: RwLock<IndexMap<String, (String, StoredResource)>>,
}

impl MemoryStorage {
    /// Creates empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a resource.
    pub fn insert(&self, name: impl Into<String>, stored: StoredResource) {
        let name = name.into();
        self.entries.write().insert(key_of(&name), (name, stored));
    }

    /// Adds or replaces a resource from a JSON manifest.
    ///
    /// # Errors
    ///
    /// [`StorageError::InvalidManifest`] when the JSON does not parse.
    pub fn insert_json(
        &self,
        name: impl Into<String>,
        manifest: &str,
        size: u64,
    ) -> Result<(), StorageError> {
        let name = name.into();
        let manifest =
            ResourceManifest::from_json(manifest).map_err(|err| StorageError::InvalidManifest {
                name: name.clone(),
                reason: err.to_string(),
            })?;
        self.insert(name, StoredResource::new(manifest, size));
        Ok(())
    }

    /// Removes a resource, returning what was stored.
    pub fn remove(&self, name: &str) -> Option<StoredResource> {
        self.entries
            .write()
            .shift_remove(&key_of(name))
            .map(|(_, stored)| stored)
    }
}

impl ResourceStorage for MemoryStorage {
    fn open(&self, name: &str) -> Result<StoredResource, StorageError> {
        self.entries
            .read()
            .get(&key_of(name))
            .map(|(_, stored)| stored.clone())
            .ok_or_else(|| StorageError::NotFound(name.to_string()))
    }

    fn enumerate(&self) -> Result<Vec<String>, StorageError> {
        Ok(self
            .entries
            .read()
            .values()
            .map(|(name, _)| name.clone())
            .collect())
    }
}
