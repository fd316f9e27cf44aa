//! Wire types for the topology response pushed to the streaming client.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{NodeId, Resource};

/// The graph section: unique nodes, derived edges and label groups.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Graph {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub groups: Vec<Group>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
}

/// A derived connects-to relationship. The annotation owner is the source;
/// the referenced name label value is the target.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Edge {
    pub source: NodeId,
    pub target: String,
}

/// Nodes sharing one `part-of` label value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Group {
    pub id: String,
    pub name: String,
    pub nodes: Vec<NodeId>,
}

/// Per-node entry in the topology section: the node's resources plus display
/// metadata filled in by the UI layer, not by this service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeData {
    pub id: NodeId,
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(rename = "resource")]
    pub resources: Vec<Resource>,
    pub data: DisplayData,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DisplayData {
    pub url: String,
    #[serde(rename = "editUrl")]
    pub edit_url: String,
    #[serde(rename = "builderImage")]
    pub builder_image: String,
    #[serde(rename = "donutStatus")]
    pub donut_status: BTreeMap<String, String>,
}

impl DisplayData {
    /// Placeholder values; the consuming UI resolves real links.
    pub fn placeholder(builder_image: impl Into<String>) -> Self {
        Self {
            url: "dummy_url".to_string(),
            edit_url: "dummy_edit_url".to_string(),
            builder_image: builder_image.into(),
            donut_status: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerMeta {
    pub commit: String,
}

/// One full snapshot as serialized to the client. Built fresh on every
/// projection; never mutated in place.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TopologyResponse {
    pub graph: Graph,
    pub topology: BTreeMap<NodeId, NodeData>,
    #[serde(rename = "serverData")]
    pub server_data: ServerMeta,
}

impl TopologyResponse {
    pub fn empty(commit: impl Into<String>) -> Self {
        Self {
            graph: Graph::default(),
            topology: BTreeMap::new(),
            server_data: ServerMeta { commit: commit.into() },
        }
    }
}
