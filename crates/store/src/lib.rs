//! Topod store: the registry task owning all topology state.
//!
//! A single writer consumes typed registry messages, mutates the node
//! registry, reprojects the graph and swaps the published snapshot — one
//! critical section per event, so readers only ever observe complete
//! snapshots.

#![forbid(unsafe_code)]

use std::sync::Arc;

use arc_swap::ArcSwap;
use rustc_hash::FxHashMap;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use topo_core::{RegistryEvent, TopologyResponse};
use topo_kubehub::{DependentWatchFactory, WatchGuard};

pub mod project;
pub mod registry;

pub use project::project;
pub use registry::NodeRegistry;

/// Read side: the latest snapshot and an epoch channel that ticks on every
/// swap.
#[derive(Clone)]
pub struct TopologyHandle {
    snap: Arc<ArcSwap<TopologyResponse>>,
    epoch_rx: watch::Receiver<u64>,
}

impl TopologyHandle {
    pub fn current(&self) -> Arc<TopologyResponse> {
        self.snap.load_full()
    }

    pub fn subscribe_epoch(&self) -> watch::Receiver<u64> {
        self.epoch_rx.clone()
    }
}

/// Write side: the event sender plus the shutdown signal. Stopping (or
/// dropping) the handle makes the registry task stop every dependent
/// watcher and exit.
pub struct RegistryHandle {
    events: mpsc::UnboundedSender<RegistryEvent>,
    stop: watch::Sender<bool>,
}

impl RegistryHandle {
    pub fn events(&self) -> mpsc::UnboundedSender<RegistryEvent> {
        self.events.clone()
    }

    pub fn stop(&self) {
        let _ = self.stop.send(true);
    }
}

impl Drop for RegistryHandle {
    fn drop(&mut self) {
        let _ = self.stop.send(true);
    }
}

/// Spawn the registry owner task.
///
/// It alone mutates the registry and the dependent-watcher set: a workload's
/// first sighting starts its dependent watch group (which feeds events back
/// into the same channel), a workload deletion stops it. After every applied
/// event the graph is reprojected and published.
pub fn spawn_registry(
    factory: DependentWatchFactory,
    commit: String,
) -> (RegistryHandle, TopologyHandle) {
    let (tx, mut rx) = mpsc::unbounded_channel::<RegistryEvent>();
    let (stop_tx, mut stop_rx) = watch::channel(false);
    let snap = Arc::new(ArcSwap::from_pointee(TopologyResponse::empty(commit.clone())));
    let (epoch_tx, epoch_rx) = watch::channel(0u64);

    let published = Arc::clone(&snap);
    let feedback = tx.clone();
    tokio::spawn(async move {
        let mut registry = NodeRegistry::new();
        let mut dependents: FxHashMap<String, WatchGuard> = FxHashMap::default();
        let mut epoch = 0u64;

        loop {
            let event = tokio::select! {
                maybe = rx.recv() => match maybe {
                    Some(event) => event,
                    None => break,
                },
                _ = stop_rx.changed() => break,
            };

            metrics::counter!("registry_events_total", 1u64);
            match &event {
                RegistryEvent::NodeUpserted { meta, .. } => {
                    if !dependents.contains_key(&meta.name) {
                        let guard = factory.spawn(&meta.name, feedback.clone());
                        dependents.insert(meta.name.clone(), guard);
                        debug!(node = %meta.name, "dependent watch group created");
                    }
                }
                RegistryEvent::NodeDeleted { name } => {
                    if let Some(guard) = dependents.remove(name) {
                        guard.stop();
                        debug!(node = %name, "dependent watch group stopped");
                    }
                }
                _ => {}
            }
            if !registry.apply(event) {
                debug!("event for unknown node dropped");
            }

            let next = project(&registry, &commit);
            metrics::gauge!("topology_nodes", next.graph.nodes.len() as f64);
            epoch = epoch.saturating_add(1);
            published.store(Arc::new(next));
            let _ = epoch_tx.send(epoch);
        }

        // Stop every dependent watcher before exiting.
        for (name, guard) in dependents.drain() {
            guard.stop();
            debug!(node = %name, "dependent watch stopped on drain");
        }
        info!("registry task stopped");
    });

    (RegistryHandle { events: tx, stop: stop_tx }, TopologyHandle { snap, epoch_rx })
}
