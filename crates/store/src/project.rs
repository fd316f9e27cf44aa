//! Projection of the registry's current contents into a publishable graph.
//!
//! Pure over the registry; every call builds a fresh immutable snapshot.

use rustc_hash::FxHashSet;

use topo_core::{
    DisplayData, Edge, Graph, Group, Node, NodeData, NodeId, ServerMeta, TopologyResponse,
    CONNECTS_TO_ANNOTATION, NAME_LABEL, PART_OF_LABEL,
};

use crate::registry::NodeRegistry;

pub fn project(registry: &NodeRegistry, commit: &str) -> TopologyResponse {
    TopologyResponse {
        graph: Graph {
            nodes: unique_nodes(registry),
            edges: edges(registry),
            groups: groups(registry),
        },
        topology: topology(registry),
        server_data: ServerMeta { commit: commit.to_string() },
    }
}

/// One entry per record, deduplicated by identity, name-sorted for a stable
/// wire order.
fn unique_nodes(registry: &NodeRegistry) -> Vec<Node> {
    let mut seen: FxHashSet<NodeId> = FxHashSet::default();
    let mut nodes: Vec<Node> = registry
        .records()
        .filter(|record| seen.insert(record.meta.id.clone()))
        .map(|record| Node { id: record.meta.id.clone(), name: record.meta.name.clone() })
        .collect();
    nodes.sort_by(|a, b| a.name.cmp(&b.name));
    nodes
}

/// One group per distinct `part-of` value, holding every member identity.
fn groups(registry: &NodeRegistry) -> Vec<Group> {
    registry
        .label_index(PART_OF_LABEL, None)
        .into_iter()
        .map(|(value, members)| {
            let mut nodes: Vec<NodeId> = members.into_iter().map(|meta| meta.id).collect();
            nodes.sort();
            Group { id: format!("group:{value}"), name: value, nodes }
        })
        .collect()
}

/// The annotation owner is the source; the referenced name is the target.
/// An edge is emitted per owner and matching named node, so a dangling
/// reference (no node carrying that name) yields nothing.
fn edges(registry: &NodeRegistry) -> Vec<Edge> {
    let mut edges = Vec::new();
    for (target, owners) in registry.annotation_index(CONNECTS_TO_ANNOTATION) {
        let named = registry.label_index(NAME_LABEL, Some(&target));
        let Some(matches) = named.get(&target) else {
            continue;
        };
        for owner in &owners {
            for _named_node in matches {
                edges.push(Edge { source: owner.clone(), target: target.clone() });
            }
        }
    }
    edges
}

/// Per-node resource lists plus placeholder display metadata; real URLs are
/// resolved by the consuming UI.
fn topology(registry: &NodeRegistry) -> std::collections::BTreeMap<NodeId, NodeData> {
    registry
        .records()
        .map(|record| {
            let builder_image = record
                .meta
                .labels
                .get(NAME_LABEL)
                .cloned()
                .unwrap_or_default();
            (
                record.meta.id.clone(),
                NodeData {
                    id: record.meta.id.clone(),
                    name: record.meta.name.clone(),
                    node_type: record.meta.category.clone(),
                    resources: record.resources.to_vec(),
                    data: DisplayData::placeholder(builder_image),
                },
            )
        })
        .collect()
}
