//! Shaping of raw watched objects into the common resource form.

use anyhow::{Context, Result};
use kube::api::DynamicObject;
use tracing::warn;

use topo_core::{EventKind, NodeMeta, RegistryEvent, Resource, ResourceKind};

use crate::mux::RawEvent;

/// Classify an object by its TypeMeta kind tag, falling back to the watched
/// kind when the payload omits TypeMeta. Unknown kinds yield `None`.
pub fn classify(watched: ResourceKind, object: &DynamicObject) -> Option<ResourceKind> {
    match object.types.as_ref().map(|t| t.kind.as_str()) {
        None | Some("") => Some(watched),
        Some(kind) => match ResourceKind::from_kind(kind) {
            Some(known) => Some(known),
            None => {
                warn!(kind = %kind, "unknown object kind dropped");
                None
            }
        },
    }
}

/// Convert a watched object into the wire resource shape: name, kind tag,
/// serialized object metadata and serialized status.
pub fn format_resource(kind: ResourceKind, object: &DynamicObject) -> Result<Resource> {
    let name = object.metadata.name.clone().unwrap_or_default();
    let metadata =
        serde_json::to_string(&object.metadata).context("serializing object metadata")?;
    let status = match object.data.get("status") {
        Some(s) => serde_json::to_string(s).context("serializing object status")?,
        None => "{}".to_string(),
    };
    Ok(Resource { name, kind, metadata, status })
}

/// Build node metadata for a workload object. Objects without a UID or name
/// cannot form a node and yield `None`.
pub fn node_meta(kind: ResourceKind, object: &DynamicObject) -> Option<NodeMeta> {
    let uid = object.metadata.uid.as_deref()?;
    let name = object.metadata.name.clone()?;
    let labels = object.metadata.labels.clone().unwrap_or_default();
    let annotations = object.metadata.annotations.clone().unwrap_or_default();
    Some(NodeMeta::new(uid, name, kind, labels, annotations))
}

/// Reduce a workload watch event to a registry message. Non-workload kinds
/// and malformed objects are logged and dropped.
pub fn workload_event(ev: RawEvent) -> Option<RegistryEvent> {
    if !ev.kind.is_workload() {
        warn!(kind = %ev.kind, "ignoring non-workload kind on workload stream");
        return None;
    }
    match ev.event {
        EventKind::Added | EventKind::Modified => {
            let meta = match node_meta(ev.kind, &ev.object) {
                Some(meta) => meta,
                None => {
                    warn!(kind = %ev.kind, "workload object missing uid or name");
                    return None;
                }
            };
            let resource = match format_resource(ev.kind, &ev.object) {
                Ok(resource) => resource,
                Err(err) => {
                    warn!(kind = %ev.kind, error = %err, "failed to format workload resource");
                    return None;
                }
            };
            Some(RegistryEvent::NodeUpserted { meta, resource })
        }
        EventKind::Deleted => {
            let name = ev.object.metadata.name.clone()?;
            Some(RegistryEvent::NodeDeleted { name })
        }
    }
}

/// Reduce a dependent-resource watch event to a registry message for the
/// node it was watched under.
pub fn dependent_event(node: &str, ev: RawEvent) -> Option<RegistryEvent> {
    match ev.event {
        EventKind::Added | EventKind::Modified => match format_resource(ev.kind, &ev.object) {
            Ok(resource) => {
                Some(RegistryEvent::ResourceUpserted { node: node.to_string(), resource })
            }
            Err(err) => {
                warn!(kind = %ev.kind, node = %node, error = %err, "failed to format resource");
                None
            }
        },
        EventKind::Deleted => {
            Some(RegistryEvent::ResourceDeleted { node: node.to_string(), kind: ev.kind })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use topo_core::node_id;

    fn workload(name: &str, uid: &str) -> DynamicObject {
        serde_json::from_value(serde_json::json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {
                "name": name,
                "uid": uid,
                "labels": { "app.kubernetes.io/name": name },
            },
            "status": { "replicas": 2 },
        }))
        .unwrap()
    }

    #[test]
    fn format_resource_extracts_metadata_and_status() {
        let obj = workload("nginx", "uid-1");
        let r = format_resource(ResourceKind::Deployment, &obj).unwrap();
        assert_eq!(r.name, "nginx");
        assert_eq!(r.kind, ResourceKind::Deployment);
        let meta: serde_json::Value = serde_json::from_str(&r.metadata).unwrap();
        assert_eq!(meta["name"], "nginx");
        let status: serde_json::Value = serde_json::from_str(&r.status).unwrap();
        assert_eq!(status["replicas"], 2);
    }

    #[test]
    fn format_resource_without_status_yields_empty_object() {
        let obj: DynamicObject = serde_json::from_value(serde_json::json!({
            "apiVersion": "v1",
            "kind": "Service",
            "metadata": { "name": "svc", "uid": "uid-2" },
        }))
        .unwrap();
        let r = format_resource(ResourceKind::Service, &obj).unwrap();
        assert_eq!(r.status, "{}");
    }

    #[test]
    fn workload_event_maps_added_to_upsert() {
        let ev = RawEvent {
            event: EventKind::Added,
            kind: ResourceKind::Deployment,
            object: workload("nginx", "uid-1"),
        };
        match workload_event(ev) {
            Some(RegistryEvent::NodeUpserted { meta, resource }) => {
                assert_eq!(meta.id, node_id("uid-1"));
                assert_eq!(meta.name, "nginx");
                assert_eq!(meta.category, "workload");
                assert_eq!(resource.kind, ResourceKind::Deployment);
            }
            other => panic!("unexpected mapping: {other:?}"),
        }
    }

    #[test]
    fn workload_event_maps_deleted_to_node_deleted() {
        let ev = RawEvent {
            event: EventKind::Deleted,
            kind: ResourceKind::Deployment,
            object: workload("nginx", "uid-1"),
        };
        match workload_event(ev) {
            Some(RegistryEvent::NodeDeleted { name }) => assert_eq!(name, "nginx"),
            other => panic!("unexpected mapping: {other:?}"),
        }
    }

    #[test]
    fn dependent_event_maps_deleted_to_resource_deleted() {
        let ev = RawEvent {
            event: EventKind::Deleted,
            kind: ResourceKind::Service,
            object: workload("nginx", "uid-3"),
        };
        match dependent_event("nginx", ev) {
            Some(RegistryEvent::ResourceDeleted { node, kind }) => {
                assert_eq!(node, "nginx");
                assert_eq!(kind, ResourceKind::Service);
            }
            other => panic!("unexpected mapping: {other:?}"),
        }
    }

    #[test]
    fn classify_prefers_type_meta_and_drops_unknown_kinds() {
        let svc: DynamicObject = serde_json::from_value(serde_json::json!({
            "apiVersion": "v1",
            "kind": "Service",
            "metadata": { "name": "svc" },
        }))
        .unwrap();
        assert_eq!(classify(ResourceKind::Service, &svc), Some(ResourceKind::Service));

        let pod: DynamicObject = serde_json::from_value(serde_json::json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": { "name": "pod" },
        }))
        .unwrap();
        assert_eq!(classify(ResourceKind::Service, &pod), None);

        let mut untyped = svc.clone();
        untyped.types = None;
        assert_eq!(classify(ResourceKind::Route, &untyped), Some(ResourceKind::Route));
    }

    #[test]
    fn non_workload_kind_on_workload_stream_is_dropped() {
        let ev = RawEvent {
            event: EventKind::Added,
            kind: ResourceKind::Service,
            object: workload("svc", "uid-4"),
        };
        assert!(workload_event(ev).is_none());
    }
}
