//! The resource data model.
//!
//! A [`Resource`] is the registry's record of one deployable bundle: its
//! identity, what storage said about it, and the runtime state the
//! controller and resolver maintain for it.

use core::cmp::Ordering;
use core::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Returns the case-insensitive registry key for a resource name.
#[must_use]
pub fn key_of(name: &str) -> String {
    name.to_lowercase()
}

// ─────────────────────────────────────────────────────────────────────────────
// Identifiers
// ─────────────────────────────────────────────────────────────────────────────

/// Host-scoped 16-bit identifier used to reference a resource over the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SyncId(u16);

impl SyncId {
    /// Raw value meaning "no id assigned". Never handed out.
    pub const INVALID_RAW: u16 = 0xFFFF;

    /// Wraps a raw id, rejecting the sentinel.
    #[must_use]
    pub fn new(raw: u16) -> Option<Self> {
        (raw != Self::INVALID_RAW).then_some(Self(raw))
    }

    /// Returns the raw value.
    #[must_use]
    pub fn get(self) -> u16 {
        self.0
    }
}

impl fmt::Display for SyncId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque handle to a resource's script execution context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ContextHandle(pub u64);

impl fmt::Display for ContextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx#{}", self.0)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// StartFlags
// ─────────────────────────────────────────────────────────────────────────────

/// The seven composition toggles of a resource.
///
/// Used both for the parts a manifest declares present and for the parts a
/// start operation asks to activate. The default enables everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct StartFlags {
    /// Server-side configuration files.
    pub configs: bool,
    /// Map files.
    pub maps: bool,
    /// Server-side scripts.
    pub scripts: bool,
    /// Markup/HTML content.
    pub html: bool,
    /// Client-side configuration files.
    pub client_configs: bool,
    /// Client-side scripts.
    pub client_scripts: bool,
    /// Client-side files.
    pub client_files: bool,
}

impl StartFlags {
    /// Every part enabled.
    pub const ALL: Self = Self {
        configs: true,
        maps: true,
        scripts: true,
        html: true,
        client_configs: true,
        client_scripts: true,
        client_files: true,
    };

    /// Every part disabled.
    pub const NONE: Self = Self {
        configs: false,
        maps: false,
        scripts: false,
        html: false,
        client_configs: false,
        client_scripts: false,
        client_files: false,
    };

    /// Parts enabled in both `self` and `other`.
    #[must_use]
    pub fn intersect(self, other: Self) -> Self {
        Self {
            configs: self.configs && other.configs,
            maps: self.maps && other.maps,
            scripts: self.scripts && other.scripts,
            html: self.html && other.html,
            client_configs: self.client_configs && other.client_configs,
            client_scripts: self.client_scripts && other.client_scripts,
            client_files: self.client_files && other.client_files,
        }
    }

    /// Only the parts relevant to connected clients.
    #[must_use]
    pub fn client_parts(self) -> Self {
        Self {
            client_configs: self.client_configs,
            client_scripts: self.client_scripts,
            client_files: self.client_files,
            ..Self::NONE
        }
    }

    /// Returns true if no part is enabled.
    #[must_use]
    pub fn is_empty(self) -> bool {
        self == Self::NONE
    }
}

impl Default for StartFlags {
    fn default() -> Self {
        Self::ALL
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ClientVersion
// ─────────────────────────────────────────────────────────────────────────────

/// A version-like minimum client requirement, e.g. `"1.5"` or `"1.5.0-9.03000"`.
///
/// Ordered component-wise: the string is split on `.` and `-`, numeric
/// components compare numerically, and missing trailing components count as
/// zero, so `"1.5" == "1.5.0"`. Greater means stricter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientVersion(String);

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Component<'a> {
    Number(u64),
    Text(&'a str),
}

impl ClientVersion {
    /// Creates a requirement from its textual form.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the textual form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn components(&self) -> Vec<Component<'_>> {
        self.0
            .split(['.', '-'])
            .filter(|part| !part.is_empty())
            .map(|part| match part.parse::<u64>() {
                Ok(number) => Component::Number(number),
                Err(_) => Component::Text(part),
            })
            .collect()
    }
}

impl Ord for ClientVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let left = self.components();
        let right = other.components();
        let len = left.len().max(right.len());
        for i in 0..len {
            let l = left.get(i).unwrap_or(&Component::Number(0));
            let r = right.get(i).unwrap_or(&Component::Number(0));
            match l.cmp(r) {
                Ordering::Equal => {}
                unequal => return unequal,
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for ClientVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for ClientVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ClientVersion {}

impl fmt::Display for ClientVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClientVersion {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Manifest
// ─────────────────────────────────────────────────────────────────────────────

/// What a resource declares about itself.
///
/// # Example
///
/// ```
/// use keystone_resources::resource::{ClientVersion, ResourceManifest};
///
/// let manifest = ResourceManifest::from_json(
///     r#"{ "dependencies": ["mapmanager"], "min_client_version": "1.5" }"#,
/// )
/// .unwrap();
///
/// assert_eq!(manifest.dependencies, vec!["mapmanager".to_string()]);
/// assert_eq!(manifest.min_client_version, Some(ClientVersion::new("1.5")));
/// assert!(manifest.parts.scripts);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceManifest {
    /// Names of resources this one requires.
    pub dependencies: Vec<String>,
    /// Parts present in the bundle.
    pub parts: StartFlags,
    /// Minimum client version this resource needs.
    pub min_client_version: Option<ClientVersion>,
    /// Whether map element data must be synchronized to clients.
    pub sync_map_element_data: Option<bool>,
}

impl ResourceManifest {
    /// Parses a manifest from JSON. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns the parse error when `json` is not a valid manifest.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Builder-style helper adding a dependency.
    #[must_use]
    pub fn with_dependency(mut self, name: impl Into<String>) -> Self {
        self.dependencies.push(name.into());
        self
    }

    /// Builder-style helper setting the minimum client version.
    #[must_use]
    pub fn with_min_client_version(mut self, version: impl Into<ClientVersion>) -> Self {
        self.min_client_version = Some(version.into());
        self
    }

    /// Builder-style helper setting the element-data sync option.
    #[must_use]
    pub fn with_sync_map_element_data(mut self, enabled: bool) -> Self {
        self.sync_map_element_data = Some(enabled);
        self
    }
}

/// What storage returns when a resource is opened.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredResource {
    /// The parsed manifest.
    pub manifest: ResourceManifest,
    /// Cosmetic grouping path, e.g. `"[gamemodes]/[race]"`.
    pub organizational_path: String,
    /// On-disk footprint in bytes.
    pub size: u64,
}

impl StoredResource {
    /// Creates a stored resource with no organizational path.
    #[must_use]
    pub fn new(manifest: ResourceManifest, size: u64) -> Self {
        Self {
            manifest,
            organizational_path: String::new(),
            size,
        }
    }

    /// Sets the organizational path.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.organizational_path = path.into();
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Resource
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle state of a registered resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceState {
    /// Registered, never started.
    Loaded,
    /// Running with an execution context.
    Started,
    /// Stopped after running, or after a failed start.
    Stopped,
}

impl fmt::Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Loaded => "loaded",
            Self::Started => "started",
            Self::Stopped => "stopped",
        })
    }
}

/// The registry record for one resource.
#[derive(Debug, Clone)]
pub struct Resource {
    pub(crate) name: String,
    pub(crate) organizational_path: String,
    pub(crate) manifest: ResourceManifest,
    pub(crate) size: u64,
    pub(crate) state: ResourceState,
    pub(crate) sync_id: Option<SyncId>,
    pub(crate) context: Option<ContextHandle>,
    pub(crate) active_parts: StartFlags,
    pub(crate) requested_flags: StartFlags,
    pub(crate) missing_dependencies: Vec<String>,
    pub(crate) dependencies_checked: bool,
    pub(crate) effective_min_client: Option<ClientVersion>,
    pub(crate) effective_sync_element_data: bool,
    pub(crate) failure: Option<String>,
    pub(crate) started_manually: bool,
    pub(crate) start_deferred: bool,
    pub(crate) loaded_at: Instant,
    pub(crate) started_at: Option<Instant>,
}

impl Resource {
    /// Creates a `Loaded` record from what storage returned.
    #[must_use]
    pub fn new(name: impl Into<String>, stored: StoredResource, loaded_at: Instant) -> Self {
        Self {
            name: name.into(),
            organizational_path: stored.organizational_path,
            manifest: stored.manifest,
            size: stored.size,
            state: ResourceState::Loaded,
            sync_id: None,
            context: None,
            active_parts: StartFlags::NONE,
            requested_flags: StartFlags::ALL,
            missing_dependencies: Vec::new(),
            dependencies_checked: false,
            effective_min_client: None,
            effective_sync_element_data: false,
            failure: None,
            started_manually: false,
            start_deferred: false,
            loaded_at,
            started_at: None,
        }
    }

    /// Name with its original spelling.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Case-insensitive registry key.
    #[must_use]
    pub fn key(&self) -> String {
        key_of(&self.name)
    }

    /// Cosmetic grouping path.
    #[must_use]
    pub fn organizational_path(&self) -> &str {
        &self.organizational_path
    }

    /// Declared manifest.
    #[must_use]
    pub fn manifest(&self) -> &ResourceManifest {
        &self.manifest
    }

    /// On-disk footprint in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ResourceState {
        self.state
    }

    /// Returns true while the resource is running.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.state == ResourceState::Started
    }

    /// Assigned sync id, present only while started.
    #[must_use]
    pub fn sync_id(&self) -> Option<SyncId> {
        self.sync_id
    }

    /// Associated execution context, present only while running.
    #[must_use]
    pub fn context(&self) -> Option<ContextHandle> {
        self.context
    }

    /// Parts activated by the last successful start.
    #[must_use]
    pub fn active_parts(&self) -> StartFlags {
        self.active_parts
    }

    /// Flags the last start asked for. Reused by restarts.
    #[must_use]
    pub fn requested_flags(&self) -> StartFlags {
        self.requested_flags
    }

    /// Declared dependencies that were not registered at the last check.
    #[must_use]
    pub fn missing_dependencies(&self) -> &[String] {
        &self.missing_dependencies
    }

    /// Strictest client requirement of this resource and everything depending on it.
    #[must_use]
    pub fn effective_min_client(&self) -> Option<&ClientVersion> {
        self.effective_min_client.as_ref()
    }

    /// Effective element-data sync option.
    #[must_use]
    pub fn effective_sync_element_data(&self) -> bool {
        self.effective_sync_element_data
    }

    /// Reason the last start or stop failed, if it did.
    #[must_use]
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    /// Whether the running instance was started by an explicit request.
    #[must_use]
    pub fn started_manually(&self) -> bool {
        self.started_manually
    }

    /// Whether a start is pending on missing dependencies.
    #[must_use]
    pub fn start_deferred(&self) -> bool {
        self.start_deferred
    }

    /// When the record was registered.
    #[must_use]
    pub fn loaded_at(&self) -> Instant {
        self.loaded_at
    }

    /// When the running instance started.
    #[must_use]
    pub fn started_at(&self) -> Option<Instant> {
        self.started_at
    }

    pub(crate) fn mark_failed(&mut self, reason: impl Into<String>) {
        self.state = ResourceState::Stopped;
        self.failure = Some(reason.into());
        self.active_parts = StartFlags::NONE;
        self.started_at = None;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Snapshots
// ─────────────────────────────────────────────────────────────────────────────

/// Administrative view of a resource.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceInfo {
    /// Resource name.
    pub name: String,
    /// Cosmetic grouping path.
    pub organizational_path: String,
    /// Lifecycle state.
    pub state: ResourceState,
    /// Sync id while started.
    pub sync_id: Option<SyncId>,
    /// Unregistered dependencies.
    pub missing_dependencies: Vec<String>,
    /// Last failure reason.
    pub failure: Option<String>,
    /// Time since start, when running.
    pub uptime: Option<Duration>,
    /// On-disk footprint in bytes.
    pub size: u64,
}

impl ResourceInfo {
    pub(crate) fn of(resource: &Resource, now: Instant) -> Self {
        Self {
            name: resource.name.clone(),
            organizational_path: resource.organizational_path.clone(),
            state: resource.state,
            sync_id: resource.sync_id,
            missing_dependencies: resource.missing_dependencies.clone(),
            failure: resource.failure.clone(),
            uptime: resource
                .started_at
                .map(|at| now.saturating_duration_since(at)),
            size: resource.size,
        }
    }
}

/// What a joining client needs to know about a running resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientResourceInfo {
    /// Resource name.
    pub name: String,
    /// Wire identifier.
    pub sync_id: SyncId,
    /// Active client-side parts.
    pub parts: StartFlags,
}
