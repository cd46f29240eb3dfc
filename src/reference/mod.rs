//! Reference resolution and bundle graph integrity.
//!
//! A reference is resolvable against the in-bundle index first (so bundles
//! may reference resources that are not persisted yet), falling back to the
//! store. Cycles among in-bundle references are rejected before any lookup:
//! the supported resource graph is directed and has no legal same-bundle
//! cycle.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::error::ResolutionError;
use crate::resource::{Resource, ResourceType};
use crate::store::ResourceStore;

type NodeKey = (ResourceType, String);

/// Index of the resources present in a submitted (not yet persisted) bundle.
#[derive(Debug, Clone, Default)]
pub struct BundleIndex {
    ids: HashSet<NodeKey>,
}

impl BundleIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_resources<'a>(resources: impl IntoIterator<Item = &'a Resource>) -> Self {
        let mut index = Self::new();
        for resource in resources {
            index.insert(resource.resource_type(), resource.id());
        }
        index
    }

    pub fn insert(&mut self, resource_type: ResourceType, id: impl Into<String>) {
        self.ids.insert((resource_type, id.into()));
    }

    pub fn contains(&self, resource_type: ResourceType, id: &str) -> bool {
        self.ids.contains(&(resource_type, id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Stateless resolver over resource data; owns no persistent state.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceResolver;

impl ReferenceResolver {
    pub fn new() -> Self {
        Self
    }

    /// Marks every reference in `resource` resolved, or fails with the
    /// first integrity violation.
    ///
    /// Resolution order: self-cycle check, in-bundle index, then the async
    /// store lookup. Idempotent: an already-resolved resource is returned
    /// unchanged without any lookup.
    pub async fn resolve(
        &self,
        mut resource: Resource,
        bundle: &BundleIndex,
        store: &dyn ResourceStore,
    ) -> Result<Resource, ResolutionError> {
        if resource.all_references_resolved() {
            return Ok(resource);
        }

        let own_key: NodeKey = (resource.resource_type(), resource.id().to_string());

        for reference in resource.references_mut() {
            if reference.resolved {
                continue;
            }
            let target_key: NodeKey =
                (reference.target_type, reference.target_id.clone());
            if target_key == own_key {
                return Err(ResolutionError::CyclicReference {
                    path: format!(
                        "{}/{} -> {}/{}",
                        own_key.0, own_key.1, own_key.0, own_key.1
                    ),
                });
            }

            let exists = bundle.contains(reference.target_type, &reference.target_id)
                || store
                    .exists(reference.target_type, &reference.target_id)
                    .await
                    .map_err(|e| ResolutionError::Lookup {
                        message: e.to_string(),
                    })?;
            if !exists {
                return Err(ResolutionError::UnknownTarget {
                    target_type: reference.target_type,
                    target_id: reference.target_id.clone(),
                });
            }
            reference.resolved = true;
        }

        Ok(resource)
    }

    /// Resolves every resource of a bundle, rejecting the bundle whole on
    /// any cycle or unresolvable reference.
    pub async fn resolve_bundle(
        &self,
        resources: Vec<Resource>,
        store: &dyn ResourceStore,
    ) -> Result<Vec<Resource>, ResolutionError> {
        detect_cycles(&resources)?;

        let index = BundleIndex::from_resources(&resources);
        let mut resolved = Vec::with_capacity(resources.len());
        for resource in resources {
            resolved.push(self.resolve(resource, &index, store).await?);
        }
        debug!(count = resolved.len(), "bundle resolved");
        Ok(resolved)
    }
}

/// Depth-first search over in-bundle reference edges with a visiting set.
/// Edges leaving the bundle cannot close a cycle and are ignored.
fn detect_cycles(resources: &[Resource]) -> Result<(), ResolutionError> {
    let mut graph: HashMap<NodeKey, Vec<NodeKey>> = HashMap::new();
    for resource in resources {
        let key = (resource.resource_type(), resource.id().to_string());
        let edges = resource
            .references()
            .into_iter()
            .map(|(_, r)| (r.target_type, r.target_id.clone()))
            .collect();
        graph.insert(key, edges);
    }

    let mut done: HashSet<NodeKey> = HashSet::new();
    let mut visiting: HashSet<NodeKey> = HashSet::new();

    for start in graph.keys() {
        if done.contains(start) {
            continue;
        }
        let mut trail = Vec::new();
        dfs(start, &graph, &mut visiting, &mut done, &mut trail)?;
    }
    Ok(())
}

fn dfs(
    node: &NodeKey,
    graph: &HashMap<NodeKey, Vec<NodeKey>>,
    visiting: &mut HashSet<NodeKey>,
    done: &mut HashSet<NodeKey>,
    trail: &mut Vec<NodeKey>,
) -> Result<(), ResolutionError> {
    visiting.insert(node.clone());
    trail.push(node.clone());

    if let Some(edges) = graph.get(node) {
        for next in edges {
            // Edges pointing outside the bundle are resolved against the
            // store later; they cannot participate in an in-bundle cycle.
            if !graph.contains_key(next) || done.contains(next) {
                continue;
            }
            if visiting.contains(next) {
                let start = trail.iter().position(|k| k == next).unwrap_or(0);
                let mut hops: Vec<String> = trail[start..]
                    .iter()
                    .map(|(t, id)| format!("{t}/{id}"))
                    .collect();
                hops.push(format!("{}/{}", next.0, next.1));
                return Err(ResolutionError::CyclicReference {
                    path: hops.join(" -> "),
                });
            }
            dfs(next, graph, visiting, done, trail)?;
        }
    }

    visiting.remove(node);
    trail.pop();
    done.insert(node.clone());
    Ok(())
}
