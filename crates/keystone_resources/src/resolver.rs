//! Dependency resolution and requirement propagation.
//!
//! Edges come from manifests: `A` requires `B` when `B` is listed in `A`'s
//! dependencies. The resolver computes dependency and dependent sets over
//! the registered resources, and derives two aggregate attributes per
//! resource:
//!
//! - the effective minimum client version, the strictest version declared
//!   by the resource or by anything that transitively depends on it;
//! - the effective element-data sync option, `true` as soon as the
//!   resource or any transitive dependent declares `true`.
//!
//! Requirements flow from dependents down onto their dependencies. A running
//! gamemode that needs a newer client forces that requirement onto the map
//! manager it uses, not the other way round.
//!
//! Every traversal is an explicit depth-first walk with a visited set, so
//! cyclic manifests terminate and surface as [`ResolverWarning::Cycle`].

use core::fmt;

use hashbrown::{HashMap, HashSet};

use crate::registry::Registry;
use crate::resource::{ClientVersion, key_of};

// ─────────────────────────────────────────────────────────────────────────────
// Results
// ─────────────────────────────────────────────────────────────────────────────

/// Dependencies of one resource, split by whether they are registered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dependencies {
    /// Registered dependencies, by registered name.
    pub resolved: Vec<String>,
    /// Declared names that are not registered.
    pub missing: Vec<String>,
}

/// Outcome of a host-wide dependency check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyReport {
    /// Resources whose dependencies were satisfied and no longer are.
    pub now_missing: Vec<String>,
    /// Resources checked for the first time with dependencies missing.
    pub missing_at_load: Vec<String>,
    /// Resources whose missing dependencies have all appeared.
    pub now_satisfied: Vec<String>,
}

/// Non-fatal condition found while walking the dependency graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolverWarning {
    /// The walk came back to a resource already on its path.
    Cycle {
        /// Resource keys along the cycle, first repeated at the end.
        path: Vec<String>,
    },
}

impl fmt::Display for ResolverWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cycle { path } => write!(f, "dependency cycle: {}", path.join(" -> ")),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Graph walking
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Clone, Copy)]
enum Direction {
    Dependencies,
    Dependents,
}

/// Adjacency over registered resources, by key.
struct Graph {
    dependencies: HashMap<String, Vec<String>>,
    dependents: HashMap<String, Vec<String>>,
}

impl Graph {
    fn of(registry: &Registry) -> Self {
        let mut dependencies: HashMap<String, Vec<String>> = HashMap::new();
        let mut dependents: HashMap<String, Vec<String>> = HashMap::new();

        for resource in registry.iter() {
            let key = resource.key();
            let mut seen = HashSet::new();
            let edges: Vec<String> = resource
                .manifest()
                .dependencies
                .iter()
                .map(|name| key_of(name))
                .filter(|dep| registry.contains(dep) && seen.insert(dep.clone()))
                .collect();
            for dep in &edges {
                dependents.entry(dep.clone()).or_default().push(key.clone());
            }
            dependencies.insert(key, edges);
        }

        Self {
            dependencies,
            dependents,
        }
    }

    fn edges(&self, key: &str, direction: Direction) -> Vec<String> {
        let map = match direction {
            Direction::Dependencies => &self.dependencies,
            Direction::Dependents => &self.dependents,
        };
        map.get(key).cloned().unwrap_or_default()
    }

    /// Walks everything reachable from `start`.
    ///
    /// `reached` is in post-order and excludes `start`, so when walking
    /// dependents every resource comes after the ones that depend on it.
    fn walk(&self, start: &str, direction: Direction) -> Walk {
        let mut walk = Walk::default();
        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(start.to_string());

        let mut path: Vec<String> = vec![start.to_string()];
        let mut stack: Vec<(Vec<String>, usize)> = vec![(self.edges(start, direction), 0)];

        loop {
            let next = match stack.last_mut() {
                None => break,
                Some((edges, cursor)) => {
                    let next = edges.get(*cursor).cloned();
                    *cursor += 1;
                    next
                }
            };

            let Some(next) = next else {
                stack.pop();
                if let Some(done) = path.pop()
                    && done != start
                {
                    walk.reached.push(done);
                }
                continue;
            };

            if let Some(pos) = path.iter().position(|key| *key == next) {
                let mut cycle = path[pos..].to_vec();
                cycle.push(next);
                walk.cycles.push(cycle);
                continue;
            }
            if !visited.insert(next.clone()) {
                continue;
            }

            stack.push((self.edges(&next, direction), 0));
            path.push(next);
        }

        walk
    }
}

#[derive(Default)]
struct Walk {
    reached: Vec<String>,
    cycles: Vec<Vec<String>>,
}

// ─────────────────────────────────────────────────────────────────────────────
// DependencyResolver
// ─────────────────────────────────────────────────────────────────────────────

/// Computes dependency sets and propagates aggregate requirements.
///
/// Holds the values each running resource declared. Effective values are
/// written back onto the registry records.
#[derive(Debug, Default)]
pub struct DependencyResolver {
    declared_min_client: HashMap<String, ClientVersion>,
    declared_sync: HashMap<String, bool>,
}

impl DependencyResolver {
    /// Creates a resolver with no declarations.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Splits the declared dependencies of `name` into registered and missing.
    ///
    /// Missing names are not an error here; the controller decides whether
    /// they block a start.
    #[must_use]
    pub fn compute_dependencies(&self, registry: &Registry, name: &str) -> Dependencies {
        let mut result = Dependencies::default();
        let Some(resource) = registry.get(name) else {
            return result;
        };

        let mut seen = HashSet::new();
        for dep in &resource.manifest().dependencies {
            if !seen.insert(key_of(dep)) {
                continue;
            }
            match registry.get(dep) {
                Some(found) => result.resolved.push(found.name().to_string()),
                None => result.missing.push(dep.clone()),
            }
        }
        result
    }

    /// Registered resources that directly require `name`.
    #[must_use]
    pub fn dependents(&self, registry: &Registry, name: &str) -> Vec<String> {
        let key = key_of(name);
        registry
            .iter()
            .filter(|resource| {
                resource
                    .manifest()
                    .dependencies
                    .iter()
                    .any(|dep| key_of(dep) == key)
            })
            .map(|resource| resource.name().to_string())
            .collect()
    }

    /// Every registered resource that transitively requires `name`.
    ///
    /// Ordered so that each resource comes after everything depending on it,
    /// which is the order to stop them in.
    #[must_use]
    pub fn transitive_dependents(&self, registry: &Registry, name: &str) -> Vec<String> {
        let graph = Graph::of(registry);
        let walk = graph.walk(&key_of(name), Direction::Dependents);
        log_cycles(&walk.cycles);
        walk.reached
            .iter()
            .filter_map(|key| registry.get(key).map(|resource| resource.name().to_string()))
            .collect()
    }

    /// Declared dependencies that are not registered, anywhere below `name`.
    ///
    /// Empty when `name` and everything it transitively requires are
    /// registered.
    #[must_use]
    pub fn transitively_missing(&self, registry: &Registry, name: &str) -> Vec<String> {
        let start = key_of(name);
        let graph = Graph::of(registry);
        let walk = graph.walk(&start, Direction::Dependencies);
        log_cycles(&walk.cycles);

        let mut missing: Vec<String> = Vec::new();
        for key in walk.reached.iter().chain([&start]) {
            for dep in self.compute_dependencies(registry, key).missing {
                if !missing.iter().any(|known| key_of(known) == key_of(&dep)) {
                    missing.push(dep);
                }
            }
        }
        missing
    }

    /// Recomputes every resource's missing dependencies.
    ///
    /// Reports resources that just lost a dependency and resources whose
    /// dependencies just became complete.
    pub fn check_all(&self, registry: &mut Registry) -> DependencyReport {
        let view: &Registry = registry;
        let updates: Vec<(String, Vec<String>)> = view
            .iter()
            .map(|resource| {
                let missing = self.compute_dependencies(view, resource.name()).missing;
                (resource.name().to_string(), missing)
            })
            .collect();

        let mut report = DependencyReport::default();
        for (name, missing) in updates {
            let Some(resource) = registry.get_mut(&name) else {
                continue;
            };
            let first_check = !resource.dependencies_checked;
            resource.dependencies_checked = true;
            let had_missing = !resource.missing_dependencies.is_empty();
            match (had_missing, missing.is_empty()) {
                (false, false) if first_check => {
                    tracing::debug!(resource = %name, missing = ?missing, "loaded with missing dependencies");
                    report.missing_at_load.push(name.clone());
                }
                (false, false) => {
                    tracing::warn!(resource = %name, missing = ?missing, "dependencies no longer satisfied");
                    report.now_missing.push(name);
                }
                (true, true) => {
                    tracing::debug!(resource = %name, "dependencies satisfied");
                    report.now_satisfied.push(name);
                }
                _ => {}
            }
            resource.missing_dependencies = missing;
        }
        report
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Aggregate requirements
    // ─────────────────────────────────────────────────────────────────────────

    /// Declares `name`'s own minimum client version and propagates it onto
    /// everything `name` depends on.
    pub fn apply_min_requirement(
        &mut self,
        registry: &mut Registry,
        name: &str,
        version: ClientVersion,
    ) -> Vec<ResolverWarning> {
        self.declared_min_client.insert(key_of(name), version);
        self.propagate(registry, name)
    }

    /// Clears `name`'s own minimum client version. Its effective value falls
    /// back to what its remaining dependents demand.
    pub fn remove_min_requirement(&mut self, registry: &mut Registry, name: &str) -> Vec<ResolverWarning> {
        self.declared_min_client.remove(&key_of(name));
        self.propagate(registry, name)
    }

    /// Declares `name`'s own element-data sync option and propagates it.
    pub fn apply_sync_option(
        &mut self,
        registry: &mut Registry,
        name: &str,
        enabled: bool,
    ) -> Vec<ResolverWarning> {
        self.declared_sync.insert(key_of(name), enabled);
        self.propagate(registry, name)
    }

    /// Clears `name`'s own element-data sync option.
    pub fn remove_sync_option(&mut self, registry: &mut Registry, name: &str) -> Vec<ResolverWarning> {
        self.declared_sync.remove(&key_of(name));
        self.propagate(registry, name)
    }

    /// Strictest minimum client version declared by any resource.
    #[must_use]
    pub fn host_min_requirement(&self) -> Option<ClientVersion> {
        self.declared_min_client.values().max().cloned()
    }

    /// Recomputes every effective value from scratch.
    ///
    /// Used after bulk changes to the edge set. Declarations of resources
    /// that are no longer registered are dropped.
    pub fn reevaluate(&mut self, registry: &mut Registry) -> Vec<ResolverWarning> {
        self.declared_min_client.retain(|key, _| registry.contains(key));
        self.declared_sync.retain(|key, _| registry.contains(key));

        let graph = Graph::of(registry);
        let keys: Vec<String> = registry.iter().map(|resource| resource.key()).collect();
        let mut cycles = Vec::new();
        for key in keys {
            cycles.extend(self.recompute(&graph, registry, &key));
        }
        finish_warnings(cycles)
    }

    /// Recomputes `name` and everything it transitively depends on.
    fn propagate(&self, registry: &mut Registry, name: &str) -> Vec<ResolverWarning> {
        let key = key_of(name);
        if !registry.contains(&key) {
            return Vec::new();
        }

        let graph = Graph::of(registry);
        let walk = graph.walk(&key, Direction::Dependencies);
        let mut cycles = walk.cycles;

        cycles.extend(self.recompute(&graph, registry, &key));
        for dependency in &walk.reached {
            cycles.extend(self.recompute(&graph, registry, dependency));
        }
        finish_warnings(cycles)
    }

    /// Sets the effective values of one resource from its own declaration
    /// and those of its transitive dependents.
    fn recompute(&self, graph: &Graph, registry: &mut Registry, key: &str) -> Vec<Vec<String>> {
        let walk = graph.walk(key, Direction::Dependents);
        let contributors = core::iter::once(key).chain(walk.reached.iter().map(String::as_str));

        let mut min_client: Option<&ClientVersion> = None;
        let mut sync = false;
        for contributor in contributors {
            if let Some(version) = self.declared_min_client.get(contributor)
                && min_client.is_none_or(|current| version > current)
            {
                min_client = Some(version);
            }
            sync |= self.declared_sync.get(contributor).copied().unwrap_or(false);
        }

        if let Some(resource) = registry.get_mut(key) {
            resource.effective_min_client = min_client.cloned();
            resource.effective_sync_element_data = sync;
        }
        walk.cycles
    }
}

fn finish_warnings(mut cycles: Vec<Vec<String>>) -> Vec<ResolverWarning> {
    cycles.sort();
    cycles.dedup();
    log_cycles(&cycles);
    cycles
        .into_iter()
        .map(|path| ResolverWarning::Cycle { path })
        .collect()
}

fn log_cycles(cycles: &[Vec<String>]) {
    for path in cycles {
        tracing::warn!(cycle = %path.join(" -> "), "dependency cycle while resolving");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;
    use crate::resource::{Resource, ResourceManifest, StoredResource};

    fn registry(entries: &[(&str, &[&str])]) -> Registry {
        let mut registry = Registry::new();
        for (name, deps) in entries {
            let manifest = ResourceManifest {
                dependencies: deps.iter().map(|dep| dep.to_string()).collect(),
                ..ResourceManifest::default()
            };
            let stored = StoredResource::new(manifest, 0);
            registry
                .register(Resource::new(*name, stored, Instant::now()))
                .unwrap();
        }
        registry
    }

    fn effective(registry: &Registry, name: &str) -> Option<String> {
        registry
            .get(name)
            .and_then(|resource| resource.effective_min_client())
            .map(ToString::to_string)
    }

    #[test]
    fn compute_dependencies_splits_missing() {
        let registry = registry(&[("base", &[]), ("race", &["Base", "scores", "base"])]);
        let deps = DependencyResolver::new().compute_dependencies(&registry, "race");

        assert_eq!(deps.resolved, vec!["base"]);
        assert_eq!(deps.missing, vec!["scores"]);
    }

    #[test]
    fn dependents_are_direct_only() {
        let registry = registry(&[("base", &[]), ("mid", &["base"]), ("top", &["mid"])]);
        let resolver = DependencyResolver::new();

        assert_eq!(resolver.dependents(&registry, "base"), vec!["mid"]);
        assert_eq!(resolver.transitive_dependents(&registry, "base"), vec!["top", "mid"]);
    }

    #[test]
    fn transitively_missing_looks_through_registered_dependencies() {
        let registry = registry(&[("mid", &["leaf"]), ("top", &["mid"]), ("solo", &[])]);
        let resolver = DependencyResolver::new();

        assert!(resolver.compute_dependencies(&registry, "top").missing.is_empty());
        assert_eq!(resolver.transitively_missing(&registry, "top"), vec!["leaf"]);
        assert!(resolver.transitively_missing(&registry, "solo").is_empty());
    }

    #[test]
    fn requirement_flows_down_to_dependencies() {
        let mut registry = registry(&[("base", &[]), ("mid", &["base"]), ("top", &["mid"])]);
        let mut resolver = DependencyResolver::new();

        resolver.apply_min_requirement(&mut registry, "top", "1.5".into());
        assert_eq!(effective(&registry, "base").as_deref(), Some("1.5"));
        assert_eq!(effective(&registry, "mid").as_deref(), Some("1.5"));
        assert_eq!(effective(&registry, "top").as_deref(), Some("1.5"));

        resolver.apply_min_requirement(&mut registry, "base", "1.3".into());
        assert_eq!(effective(&registry, "base").as_deref(), Some("1.5"));

        resolver.remove_min_requirement(&mut registry, "top");
        assert_eq!(effective(&registry, "base").as_deref(), Some("1.3"));
        assert_eq!(effective(&registry, "mid"), None);
    }

    #[test]
    fn stronger_dependent_wins() {
        let mut registry = registry(&[("base", &[]), ("a", &["base"]), ("b", &["base"])]);
        let mut resolver = DependencyResolver::new();

        resolver.apply_min_requirement(&mut registry, "a", "1.5.1".into());
        resolver.apply_min_requirement(&mut registry, "b", "1.5.0-9.03000".into());
        assert_eq!(effective(&registry, "base").as_deref(), Some("1.5.1"));
        assert_eq!(
            resolver.host_min_requirement(),
            Some(ClientVersion::new("1.5.1"))
        );
    }

    #[test]
    fn sync_option_true_is_sticky_through_dependents() {
        let mut registry = registry(&[("base", &[]), ("a", &["base"]), ("b", &["base"])]);
        let mut resolver = DependencyResolver::new();

        resolver.apply_sync_option(&mut registry, "a", false);
        resolver.apply_sync_option(&mut registry, "b", true);
        assert!(registry.get("base").unwrap().effective_sync_element_data());
        assert!(!registry.get("a").unwrap().effective_sync_element_data());

        resolver.remove_sync_option(&mut registry, "b");
        assert!(!registry.get("base").unwrap().effective_sync_element_data());
    }

    #[test]
    fn propagation_terminates_on_cycles() {
        let mut registry = registry(&[("a", &["b"]), ("b", &["a"])]);
        let mut resolver = DependencyResolver::new();

        let warnings = resolver.apply_min_requirement(&mut registry, "a", "1.1".into());
        assert!(!warnings.is_empty());
        assert_eq!(effective(&registry, "b").as_deref(), Some("1.1"));
        assert_eq!(effective(&registry, "a").as_deref(), Some("1.1"));
    }

    #[test]
    fn check_all_reports_transitions() {
        let mut registry = registry(&[("race", &["base"])]);
        let resolver = DependencyResolver::new();

        let report = resolver.check_all(&mut registry);
        assert!(report.now_missing.is_empty());
        assert_eq!(report.missing_at_load, vec!["race"]);
        assert_eq!(registry.get("race").unwrap().missing_dependencies(), ["base"]);

        let again = resolver.check_all(&mut registry);
        assert!(again.now_missing.is_empty());
        assert!(again.missing_at_load.is_empty());

        let stored = StoredResource::default();
        registry
            .register(Resource::new("base", stored, Instant::now()))
            .unwrap();
        let report = resolver.check_all(&mut registry);
        assert_eq!(report.now_satisfied, vec!["race"]);
        assert!(registry.get("race").unwrap().missing_dependencies().is_empty());

        registry.unregister("base").unwrap();
        let report = resolver.check_all(&mut registry);
        assert_eq!(report.now_missing, vec!["race"]);
        assert!(report.missing_at_load.is_empty());
    }

    #[test]
    fn reevaluate_drops_unregistered_declarations() {
        let mut registry = registry(&[("base", &[]), ("top", &["base"])]);
        let mut resolver = DependencyResolver::new();
        resolver.apply_min_requirement(&mut registry, "top", "1.5".into());

        registry.unregister("top").unwrap();
        resolver.reevaluate(&mut registry);

        assert_eq!(effective(&registry, "base"), None);
        assert_eq!(resolver.host_min_requirement(), None);
    }
}
