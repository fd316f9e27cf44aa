//! Topod kube integration – watch establishment and dependent-watch wiring.

#![forbid(unsafe_code)]

use std::sync::Arc;

use anyhow::{Context, Result};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use kube::api::{
    Api, ApiResource, DynamicObject, GroupVersionKind, ListParams, WatchEvent, WatchParams,
};
use kube::Client;

use topo_core::{EventKind, RegistryEvent, ResourceKind, NAME_LABEL};

pub mod format;
pub mod mux;

pub use format::{classify, dependent_event, format_resource, node_meta, workload_event};
pub use mux::{EventSource, RawEvent, WatchMux};

/// Callback fired once per source whose watch could not be established.
pub type WatchErrorHandler = Arc<dyn Fn(ResourceKind, &kube::Error) + Send + Sync>;

/// Connect using the ambient kubeconfig / in-cluster environment.
pub async fn default_client() -> Result<Client> {
    Client::try_default().await.context("building kube client")
}

fn api_resource(kind: ResourceKind) -> ApiResource {
    let gvk = match kind {
        ResourceKind::DeploymentConfig => {
            GroupVersionKind::gvk("apps.openshift.io", "v1", "DeploymentConfig")
        }
        ResourceKind::Deployment => GroupVersionKind::gvk("apps", "v1", "Deployment"),
        ResourceKind::Service => GroupVersionKind::gvk("", "v1", "Service"),
        ResourceKind::Route => GroupVersionKind::gvk("route.openshift.io", "v1", "Route"),
        ResourceKind::ReplicationController => {
            GroupVersionKind::gvk("", "v1", "ReplicationController")
        }
        ResourceKind::ReplicaSet => GroupVersionKind::gvk("apps", "v1", "ReplicaSet"),
    };
    ApiResource::from_gvk(&gvk)
}

fn api_for(client: &Client, kind: ResourceKind, namespace: &str) -> Api<DynamicObject> {
    Api::namespaced_with(client.clone(), namespace, &api_resource(kind))
}

/// Establish one watch and adapt it into an event source. On establishment
/// failure the error handler fires and the source is absent from the stream;
/// there is no retry.
pub async fn watch_source(
    client: &Client,
    kind: ResourceKind,
    namespace: &str,
    selector: Option<&str>,
    on_error: &(dyn Fn(ResourceKind, &kube::Error) + Send + Sync),
) -> Option<EventSource> {
    let api = api_for(client, kind, namespace);
    let mut params = WatchParams::default();
    if let Some(sel) = selector {
        params = params.labels(sel);
    }
    match api.watch(&params, "0").await {
        Ok(stream) => {
            debug!(kind = %kind, ns = %namespace, selector = ?selector, "watch established");
            let mapped = stream
                .filter_map(move |step| {
                    let out = match step {
                        Ok(WatchEvent::Added(object)) => raw_event(kind, EventKind::Added, object),
                        Ok(WatchEvent::Modified(object)) => {
                            raw_event(kind, EventKind::Modified, object)
                        }
                        Ok(WatchEvent::Deleted(object)) => {
                            raw_event(kind, EventKind::Deleted, object)
                        }
                        Ok(WatchEvent::Bookmark(_)) => None,
                        Ok(WatchEvent::Error(status)) => {
                            warn!(kind = %kind, code = status.code, "watch error event");
                            None
                        }
                        Err(err) => {
                            warn!(kind = %kind, error = %err, "watch stream error");
                            None
                        }
                    };
                    futures::future::ready(out)
                })
                .boxed();
            Some(mapped)
        }
        Err(err) => {
            on_error(kind, &err);
            None
        }
    }
}

fn raw_event(watched: ResourceKind, event: EventKind, object: DynamicObject) -> Option<RawEvent> {
    format::classify(watched, &object).map(|kind| RawEvent { event, kind, object })
}

/// Aborts the associated listen task (and, through it, every forwarder) when
/// stopped or dropped.
pub struct WatchGuard {
    task: JoinHandle<()>,
}

impl WatchGuard {
    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for WatchGuard {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Watch the namespace's workload kinds and reduce their events into
/// registry messages on `events`.
pub fn spawn_workload_watch(
    client: Client,
    namespace: String,
    events: mpsc::UnboundedSender<RegistryEvent>,
    on_error: WatchErrorHandler,
) -> WatchGuard {
    let task = tokio::spawn(async move {
        let mut sources = Vec::new();
        for kind in ResourceKind::WORKLOADS {
            if let Some(source) =
                watch_source(&client, kind, &namespace, None, on_error.as_ref()).await
            {
                sources.push(source);
            }
        }
        let mut mux = WatchMux::new(sources)
            .with_filters(vec![EventKind::Added, EventKind::Modified, EventKind::Deleted]);
        mux.start();
        info!(ns = %namespace, "workload watch started");
        mux.listen(|ev| {
            if let Some(msg) = format::workload_event(ev) {
                let _ = events.send(msg);
            }
        })
        .await;
        warn!(ns = %namespace, "workload watch ended");
    });
    WatchGuard { task }
}

/// One-shot List of every dependent kind for a workload name; seeds the
/// registry so the first snapshot is not empty. List failures degrade the
/// seed, they do not abort it.
async fn prime_dependents(
    client: &Client,
    namespace: &str,
    name: &str,
    events: &mpsc::UnboundedSender<RegistryEvent>,
) -> usize {
    let params = ListParams::default().labels(&format!("{NAME_LABEL}={name}"));
    let mut sent = 0usize;
    for kind in ResourceKind::DEPENDENTS {
        let api = api_for(client, kind, namespace);
        match api.list(&params).await {
            Ok(list) => {
                for object in list.items {
                    match format_resource(kind, &object) {
                        Ok(resource) => {
                            let msg = RegistryEvent::ResourceUpserted {
                                node: name.to_string(),
                                resource,
                            };
                            if events.send(msg).is_err() {
                                return sent;
                            }
                            sent += 1;
                        }
                        Err(err) => {
                            warn!(kind = %kind, node = %name, error = %err, "failed to format listed resource");
                        }
                    }
                }
            }
            Err(err) => {
                warn!(kind = %kind, node = %name, error = %err, "dependent list failed");
            }
        }
    }
    sent
}

/// Builds the dependent watch group for each discovered workload name:
/// prime via List, then watch every dependent kind filtered to
/// `app.kubernetes.io/name=<name>`.
#[derive(Clone)]
pub struct DependentWatchFactory {
    client: Client,
    namespace: String,
    on_error: WatchErrorHandler,
}

impl DependentWatchFactory {
    pub fn new(client: Client, namespace: impl Into<String>, on_error: WatchErrorHandler) -> Self {
        Self { client, namespace: namespace.into(), on_error }
    }

    /// Start the dependent watch group for one workload name. The returned
    /// guard cancels the whole group.
    pub fn spawn(
        &self,
        name: &str,
        events: mpsc::UnboundedSender<RegistryEvent>,
    ) -> WatchGuard {
        let client = self.client.clone();
        let namespace = self.namespace.clone();
        let on_error = self.on_error.clone();
        let name = name.to_string();
        let task = tokio::spawn(async move {
            let seeded = prime_dependents(&client, &namespace, &name, &events).await;
            debug!(node = %name, seeded, "dependent priming done");

            let selector = format!("{NAME_LABEL}={name}");
            let mut sources = Vec::new();
            for kind in ResourceKind::DEPENDENTS {
                if let Some(source) =
                    watch_source(&client, kind, &namespace, Some(&selector), on_error.as_ref())
                        .await
                {
                    sources.push(source);
                }
            }
            let mut mux = WatchMux::new(sources)
                .with_filters(vec![EventKind::Added, EventKind::Modified, EventKind::Deleted]);
            mux.start();
            info!(node = %name, ns = %namespace, "dependent watch started");
            mux.listen(|ev| {
                if let Some(msg) = format::dependent_event(&name, ev) {
                    let _ = events.send(msg);
                }
            })
            .await;
            debug!(node = %name, "dependent watch ended");
        });
        WatchGuard { task }
    }
}
