//! `:resource/path` references.
//!
//! Scripts refer to files either relative to their own resource
//! (`"maps/stadium.map"`) or inside another one (`":race/maps/stadium.map"`).

/// A file reference split into its owning resource and relative path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourcePath {
    /// Owning resource name, as written.
    pub resource: String,
    /// Path inside the resource, `/`-separated.
    pub path: String,
}

/// Parses a file reference.
///
/// `current` is the resource the reference is made from; it owns relative
/// references. Returns `None` for empty paths, paths escaping the resource
/// with `..`, and relative references without a current resource.
///
/// # Example
///
/// ```
/// use keystone_resources::path::parse_resource_path;
///
/// let path = parse_resource_path(":race/maps\\stadium.map", None).unwrap();
/// assert_eq!(path.resource, "race");
/// assert_eq!(path.path, "maps/stadium.map");
///
/// let path = parse_resource_path("client.lua", Some("scores")).unwrap();
/// assert_eq!(path.resource, "scores");
///
/// assert!(parse_resource_path(":race/../admin/acl.xml", None).is_none());
/// ```
#[must_use]
pub fn parse_resource_path(input: &str, current: Option<&str>) -> Option<ResourcePath> {
    let normalized = input.trim().replace('\\', "/");

    let (resource, path) = match normalized.strip_prefix(':') {
        Some(rest) => {
            let (resource, path) = rest.split_once('/')?;
            (resource.to_string(), path.to_string())
        }
        None => (current?.to_string(), normalized),
    };

    let segments: Vec<&str> = path
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect();
    if resource.is_empty() || segments.is_empty() || segments.contains(&"..") {
        return None;
    }

    Some(ResourcePath {
        resource,
        path: segments.join("/"),
    })
}
