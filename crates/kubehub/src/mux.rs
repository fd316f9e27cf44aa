//! Fan-in of independent watch event streams into one ordered channel.

use std::pin::Pin;

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use kube::api::DynamicObject;
use topo_core::{EventKind, ResourceKind};

/// One event as delivered by a source stream. The kind tag comes from the
/// watched API, not from inspecting the object.
#[derive(Debug)]
pub struct RawEvent {
    pub event: EventKind,
    pub kind: ResourceKind,
    pub object: DynamicObject,
}

pub type EventSource = Pin<Box<dyn Stream<Item = RawEvent> + Send>>;

/// Copies events from N sources into a single unbounded channel and replays
/// the ones whose type is in the allow-list. Delivery order is whatever the
/// underlying streams produce; nothing is deduplicated or reordered.
pub struct WatchMux {
    sources: Vec<EventSource>,
    filters: Vec<EventKind>,
    tx: Option<mpsc::UnboundedSender<RawEvent>>,
    rx: mpsc::UnboundedReceiver<RawEvent>,
    forwarders: Vec<JoinHandle<()>>,
}

impl WatchMux {
    pub fn new(sources: Vec<EventSource>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { sources, filters: Vec::new(), tx: Some(tx), rx, forwarders: Vec::new() }
    }

    /// Set the accepted event types. Events of any other type are read off
    /// the channel and discarded.
    pub fn with_filters(mut self, filters: Vec<EventKind>) -> Self {
        self.filters = filters;
        self
    }

    /// Spawn one forwarding task per source. After this the channel closes
    /// once every source ends or is stopped.
    pub fn start(&mut self) {
        let tx = match self.tx.take() {
            Some(tx) => tx,
            None => return,
        };
        for mut source in self.sources.drain(..) {
            let tx = tx.clone();
            self.forwarders.push(tokio::spawn(async move {
                while let Some(ev) = source.next().await {
                    if tx.send(ev).is_err() {
                        break;
                    }
                }
            }));
        }
    }

    /// Blocking loop: invoke the handler for every accepted event until all
    /// forwarders are gone and the channel drains.
    pub async fn listen<F>(&mut self, mut on_event: F)
    where
        F: FnMut(RawEvent),
    {
        while let Some(ev) = self.rx.recv().await {
            if self.filters.iter().any(|f| *f == ev.event) {
                metrics::counter!("watch_events_total", 1u64, "kind" => ev.kind.as_str());
                on_event(ev);
            }
        }
        debug!("watch mux channel closed");
    }

    /// Cancel every forwarding task. Events already in the channel may still
    /// be delivered by a concurrent `listen`.
    pub fn stop(&mut self) {
        for handle in self.forwarders.drain(..) {
            handle.abort();
        }
    }
}

impl Drop for WatchMux {
    fn drop(&mut self) {
        self.stop();
    }
}
