#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use topo_core::{node_id, NodeMeta, RegistryEvent, Resource, ResourceKind};
use topo_store::{project, NodeRegistry};

fn workload(
    name: &str,
    uid: &str,
    part_of: Option<&str>,
    connects_to: Option<&str>,
) -> RegistryEvent {
    let mut labels = BTreeMap::new();
    labels.insert("app.kubernetes.io/name".to_string(), name.to_string());
    if let Some(group) = part_of {
        labels.insert("app.kubernetes.io/part-of".to_string(), group.to_string());
    }
    let mut annotations = BTreeMap::new();
    if let Some(targets) = connects_to {
        annotations.insert("app.openshift.io/connects-to".to_string(), targets.to_string());
    }
    RegistryEvent::NodeUpserted {
        meta: NodeMeta::new(uid, name, ResourceKind::Deployment, labels, annotations),
        resource: Resource {
            name: name.to_string(),
            kind: ResourceKind::Deployment,
            metadata: "{}".to_string(),
            status: "{}".to_string(),
        },
    }
}

#[test]
fn groups_and_edges_for_connected_pair() {
    let mut reg = NodeRegistry::new();
    reg.apply(workload("nginx", "uid-nginx", Some("testapp"), Some(r#"["nodejs"]"#)));
    reg.apply(workload("nodejs", "uid-nodejs", Some("testapp"), None));

    let snap = project(&reg, "abc123");

    assert_eq!(snap.graph.groups.len(), 1);
    let group = &snap.graph.groups[0];
    assert_eq!(group.id, "group:testapp");
    assert_eq!(group.name, "testapp");
    let mut members = group.nodes.clone();
    members.sort();
    let mut expected = vec![node_id("uid-nginx"), node_id("uid-nodejs")];
    expected.sort();
    assert_eq!(members, expected);

    assert_eq!(snap.graph.edges.len(), 1);
    let edge = &snap.graph.edges[0];
    assert_eq!(edge.source, node_id("uid-nginx"));
    assert_eq!(edge.target, "nodejs");

    assert_eq!(snap.server_data.commit, "abc123");
}

#[test]
fn dangling_connects_to_emits_no_edge() {
    let mut reg = NodeRegistry::new();
    reg.apply(workload("nginx", "uid-nginx", None, Some(r#"["ghost"]"#)));

    let snap = project(&reg, "c");
    assert!(snap.graph.edges.is_empty());
}

#[test]
fn malformed_annotation_does_not_abort_projection() {
    let mut reg = NodeRegistry::new();
    reg.apply(workload("broken", "uid-broken", None, Some("not json")));
    reg.apply(workload("nginx", "uid-nginx", None, Some(r#"["nodejs"]"#)));
    reg.apply(workload("nodejs", "uid-nodejs", None, None));

    let snap = project(&reg, "c");

    // The broken node is skipped for edges but still projected as a node.
    assert_eq!(snap.graph.nodes.len(), 3);
    assert_eq!(snap.graph.edges.len(), 1);
    assert_eq!(snap.graph.edges[0].source, node_id("uid-nginx"));
    assert_eq!(snap.graph.edges[0].target, "nodejs");
}

#[test]
fn deleted_node_leaves_graph_entirely() {
    let mut reg = NodeRegistry::new();
    reg.apply(workload("nginx", "uid-nginx", Some("testapp"), Some(r#"["nodejs"]"#)));
    reg.apply(workload("nodejs", "uid-nodejs", Some("testapp"), None));
    reg.apply(RegistryEvent::NodeDeleted { name: "nodejs".into() });

    let snap = project(&reg, "c");

    assert_eq!(snap.graph.nodes.len(), 1);
    assert_eq!(snap.graph.nodes[0].name, "nginx");
    // No node named nodejs remains, so the edge disappears with it.
    assert!(snap.graph.edges.is_empty());
    assert_eq!(snap.graph.groups.len(), 1);
    assert_eq!(snap.graph.groups[0].nodes, vec![node_id("uid-nginx")]);
    assert!(!snap.topology.contains_key(&node_id("uid-nodejs")));
}

#[test]
fn topology_section_carries_resources_and_placeholder_data() {
    let mut reg = NodeRegistry::new();
    reg.apply(workload("nginx", "uid-nginx", None, None));
    reg.apply(RegistryEvent::ResourceUpserted {
        node: "nginx".into(),
        resource: Resource {
            name: "nginx-svc".to_string(),
            kind: ResourceKind::Service,
            metadata: "{}".to_string(),
            status: "{}".to_string(),
        },
    });

    let snap = project(&reg, "c");
    let data = &snap.topology[&node_id("uid-nginx")];
    assert_eq!(data.node_type, "workload");
    assert_eq!(data.resources.len(), 2);
    assert_eq!(data.data.url, "dummy_url");
    assert_eq!(data.data.edit_url, "dummy_edit_url");
    assert_eq!(data.data.builder_image, "nginx");
}

#[test]
fn nodes_deduplicate_by_identity() {
    let mut reg = NodeRegistry::new();
    // Same workload observed twice keeps one node entry.
    reg.apply(workload("nginx", "uid-nginx", None, None));
    reg.apply(workload("nginx", "uid-nginx", None, None));

    let snap = project(&reg, "c");
    assert_eq!(snap.graph.nodes.len(), 1);
}

#[test]
fn edge_per_owner_and_matching_named_node() {
    let mut reg = NodeRegistry::new();
    reg.apply(workload("a", "uid-a", None, Some(r#"["shared"]"#)));
    reg.apply(workload("b", "uid-b", None, Some(r#"["shared"]"#)));
    reg.apply(workload("shared", "uid-shared", None, None));

    let snap = project(&reg, "c");
    assert_eq!(snap.graph.edges.len(), 2);
    assert!(snap.graph.edges.iter().all(|e| e.target == "shared"));
    let mut sources: Vec<_> = snap.graph.edges.iter().map(|e| e.source.clone()).collect();
    sources.sort();
    let mut expected = vec![node_id("uid-a"), node_id("uid-b")];
    expected.sort();
    assert_eq!(sources, expected);
}
