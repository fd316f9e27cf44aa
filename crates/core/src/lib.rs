//! Topod core types: watch events, resource kinds, node records and the
//! registry message set shared by every other crate.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

pub mod graph;

pub use graph::{DisplayData, Edge, Graph, Group, Node, NodeData, ServerMeta, TopologyResponse};

/// Label carrying the workload name dependent resources are correlated by.
pub const NAME_LABEL: &str = "app.kubernetes.io/name";
/// Label whose value groups nodes into one application.
pub const PART_OF_LABEL: &str = "app.kubernetes.io/part-of";
/// Annotation holding a JSON array of target workload names.
pub const CONNECTS_TO_ANNOTATION: &str = "app.openshift.io/connects-to";

/// Opaque, stable node identity: the base64 encoding of the object's UID.
pub type NodeId = String;

/// Encode a cluster UID into a [`NodeId`].
pub fn node_id(uid: &str) -> NodeId {
    BASE64.encode(uid.as_bytes())
}

/// Watch event types accepted by the multiplexer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum EventKind {
    Added,
    Modified,
    Deleted,
}

/// The closed set of resource kinds this service understands.
///
/// Anything else coming off a watch stream is logged and dropped.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    DeploymentConfig,
    Deployment,
    Service,
    Route,
    ReplicationController,
    ReplicaSet,
}

impl ResourceKind {
    /// Kinds that form topology nodes.
    pub const WORKLOADS: [ResourceKind; 2] =
        [ResourceKind::DeploymentConfig, ResourceKind::Deployment];

    /// Kinds watched per workload name, correlated by label.
    pub const DEPENDENTS: [ResourceKind; 5] = [
        ResourceKind::DeploymentConfig,
        ResourceKind::Service,
        ResourceKind::Route,
        ResourceKind::ReplicationController,
        ResourceKind::ReplicaSet,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::DeploymentConfig => "DeploymentConfig",
            ResourceKind::Deployment => "Deployment",
            ResourceKind::Service => "Service",
            ResourceKind::Route => "Route",
            ResourceKind::ReplicationController => "ReplicationController",
            ResourceKind::ReplicaSet => "ReplicaSet",
        }
    }

    /// Classify a kind string from object TypeMeta; `None` for unknown kinds.
    pub fn from_kind(kind: &str) -> Option<ResourceKind> {
        match kind {
            "DeploymentConfig" => Some(ResourceKind::DeploymentConfig),
            "Deployment" => Some(ResourceKind::Deployment),
            "Service" => Some(ResourceKind::Service),
            "Route" => Some(ResourceKind::Route),
            "ReplicationController" => Some(ResourceKind::ReplicationController),
            "ReplicaSet" => Some(ResourceKind::ReplicaSet),
            _ => None,
        }
    }

    pub fn is_workload(&self) -> bool {
        matches!(self, ResourceKind::DeploymentConfig | ResourceKind::Deployment)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One dependent object (or the workload itself) attached to a node, shaped
/// for the wire: metadata and status are carried as pre-serialized JSON.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Resource {
    pub name: String,
    pub kind: ResourceKind,
    pub metadata: String,
    pub status: String,
}

/// Metadata of a discovered workload node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeMeta {
    pub id: NodeId,
    pub name: String,
    pub kind: ResourceKind,
    /// Node category on the wire; always `"workload"` for watched kinds.
    #[serde(rename = "type")]
    pub category: String,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
}

impl NodeMeta {
    pub fn new(
        uid: &str,
        name: impl Into<String>,
        kind: ResourceKind,
        labels: BTreeMap<String, String>,
        annotations: BTreeMap<String, String>,
    ) -> Self {
        Self {
            id: node_id(uid),
            name: name.into(),
            kind,
            category: "workload".to_string(),
            labels,
            annotations,
        }
    }
}

/// A registry entry: node metadata plus its resources, at most one per kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRecord {
    pub meta: NodeMeta,
    pub resources: SmallVec<[Resource; 6]>,
}

impl NodeRecord {
    pub fn new(meta: NodeMeta) -> Self {
        Self { meta, resources: SmallVec::new() }
    }
}

/// Typed messages consumed by the single-writer registry task. Every watch
/// producer reduces its events to one of these.
#[derive(Debug, Clone)]
pub enum RegistryEvent {
    /// A workload appeared or changed; carries its own formatted resource.
    NodeUpserted { meta: NodeMeta, resource: Resource },
    /// A workload was deleted; drops the record and all attached resources.
    NodeDeleted { name: String },
    /// A dependent resource appeared or changed under the named node.
    ResourceUpserted { node: String, resource: Resource },
    /// A dependent resource of the given kind left the named node.
    ResourceDeleted { node: String, kind: ResourceKind },
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine as _;

    #[test]
    fn node_id_is_stable_base64() {
        let id = node_id("0422b1d8-9f0e-4cbe-a968-7c4fb2c8f0a5");
        assert_eq!(id, node_id("0422b1d8-9f0e-4cbe-a968-7c4fb2c8f0a5"));
        assert_ne!(id, node_id("some-other-uid"));
        // stays decodable
        let raw = BASE64.decode(&id).unwrap();
        assert_eq!(raw, b"0422b1d8-9f0e-4cbe-a968-7c4fb2c8f0a5");
    }

    #[test]
    fn kind_roundtrip() {
        for kind in [
            ResourceKind::DeploymentConfig,
            ResourceKind::Deployment,
            ResourceKind::Service,
            ResourceKind::Route,
            ResourceKind::ReplicationController,
            ResourceKind::ReplicaSet,
        ] {
            assert_eq!(ResourceKind::from_kind(kind.as_str()), Some(kind));
        }
        assert_eq!(ResourceKind::from_kind("Pod"), None);
    }

    #[test]
    fn resource_kind_serializes_as_kind_string() {
        let r = Resource {
            name: "nginx".into(),
            kind: ResourceKind::Service,
            metadata: "{}".into(),
            status: "{}".into(),
        };
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["kind"], "Service");
    }

    #[test]
    fn workload_kinds_are_workloads() {
        assert!(ResourceKind::Deployment.is_workload());
        assert!(ResourceKind::DeploymentConfig.is_workload());
        assert!(!ResourceKind::Service.is_workload());
    }
}
