//! The canonical store of discovered workload nodes and their resources.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;
use tracing::warn;

use topo_core::{NodeId, NodeMeta, NodeRecord, RegistryEvent, Resource, ResourceKind};

/// Node records keyed by workload name.
///
/// Dependent resources are correlated to nodes by the name label value, not
/// by UID, so the name is also the lookup key. Two workloads sharing a name
/// collide; that is a documented limitation of the correlation scheme.
#[derive(Debug, Default)]
pub struct NodeRegistry {
    nodes: FxHashMap<String, NodeRecord>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&NodeRecord> {
        self.nodes.get(name)
    }

    pub fn records(&self) -> impl Iterator<Item = &NodeRecord> {
        self.nodes.values()
    }

    /// Create the record on first sight; afterwards replace the metadata in
    /// place, keeping every resource already attached.
    pub fn upsert_node(&mut self, meta: NodeMeta) {
        match self.nodes.entry(meta.name.clone()) {
            std::collections::hash_map::Entry::Occupied(mut entry) => {
                entry.get_mut().meta = meta;
            }
            std::collections::hash_map::Entry::Vacant(entry) => {
                entry.insert(NodeRecord::new(meta));
            }
        }
    }

    /// Remove the record and everything attached to it.
    pub fn delete_node(&mut self, name: &str) -> bool {
        self.nodes.remove(name).is_some()
    }

    /// Attach or replace the resource of its kind under the named node; at
    /// most one resource per kind survives. Returns false when no such node
    /// exists.
    pub fn upsert_resource(&mut self, name: &str, resource: Resource) -> bool {
        let Some(record) = self.nodes.get_mut(name) else {
            return false;
        };
        if let Some(existing) =
            record.resources.iter_mut().find(|r| r.kind == resource.kind)
        {
            *existing = resource;
        } else {
            record.resources.push(resource);
        }
        true
    }

    /// Drop the resource of the given kind from the named node, if present.
    pub fn delete_resource(&mut self, name: &str, kind: ResourceKind) -> bool {
        let Some(record) = self.nodes.get_mut(name) else {
            return false;
        };
        let before = record.resources.len();
        record.resources.retain(|r| r.kind != kind);
        record.resources.len() != before
    }

    /// Apply one registry message. Returns false when the event targeted an
    /// unknown node and was dropped.
    pub fn apply(&mut self, event: RegistryEvent) -> bool {
        match event {
            RegistryEvent::NodeUpserted { meta, resource } => {
                let name = meta.name.clone();
                self.upsert_node(meta);
                self.upsert_resource(&name, resource)
            }
            RegistryEvent::NodeDeleted { name } => self.delete_node(&name),
            RegistryEvent::ResourceUpserted { node, resource } => {
                self.upsert_resource(&node, resource)
            }
            RegistryEvent::ResourceDeleted { node, kind } => self.delete_resource(&node, kind),
        }
    }

    /// Map each value of `label` to the metadata of the nodes carrying it,
    /// optionally restricted to one value. Nodes without the label are
    /// absent from the index.
    pub fn label_index(&self, label: &str, filter: Option<&str>) -> BTreeMap<String, Vec<NodeMeta>> {
        let mut index: BTreeMap<String, Vec<NodeMeta>> = BTreeMap::new();
        for record in self.nodes.values() {
            let Some(value) = record.meta.labels.get(label) else {
                continue;
            };
            if let Some(wanted) = filter {
                if wanted != value {
                    continue;
                }
            }
            index.entry(value.clone()).or_default().push(record.meta.clone());
        }
        index
    }

    /// Parse `annotation` on every node as a JSON array of target names and
    /// map each target to the identities of the nodes referencing it. A node
    /// with a malformed annotation is skipped, not fatal.
    pub fn annotation_index(&self, annotation: &str) -> BTreeMap<String, Vec<NodeId>> {
        let mut index: BTreeMap<String, Vec<NodeId>> = BTreeMap::new();
        for record in self.nodes.values() {
            let Some(raw) = record.meta.annotations.get(annotation) else {
                continue;
            };
            match serde_json::from_str::<Vec<String>>(raw) {
                Ok(targets) => {
                    for target in targets {
                        index.entry(target).or_default().push(record.meta.id.clone());
                    }
                }
                Err(err) => {
                    warn!(node = %record.meta.name, annotation = %annotation, error = %err,
                        "malformed annotation, node skipped");
                }
            }
        }
        index
    }
}
